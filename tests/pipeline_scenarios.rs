//! Exercises the Aggregator -> Detector boundary with synthetic sampler
//! output, standing in for the external load generator and `/proc` sources.

use chainbench::aggregator::Aggregator;
use chainbench::config::{Config, DeviceConfig};
use chainbench::detector::{BottleneckDetector, TickOutcome};
use chainbench::models::{
    CpuFields, DeviceFields, HealthStatus, LevelResult, LoadGenFields, MemoryFields,
    MonitorOverheadFields, NetworkFields, VolumeType,
};
use chainbench::samplers::{NodeHeightSample, SamplerOutput};
use tempfile::tempdir;
use tokio::sync::mpsc;

fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.devices = vec![DeviceConfig {
        name: "nvme0n1".to_string(),
        baseline_iops: 3000.0,
        baseline_throughput_mibs: 125.0,
        volume_type: VolumeType::Ebs,
    }];
    config.paths.snapshot_dir = root.join("snapshot");
    config.consecutive_confirmations_k = 3;
    config
}

fn healthy_tick(seq: u64) -> Vec<SamplerOutput> {
    vec![
        SamplerOutput::Cpu(CpuFields { usage_pct: 40.0, user_pct: 30.0, system_pct: 10.0, iowait_pct: 0.0, softirq_pct: 0.0, idle_pct: 60.0 }),
        SamplerOutput::Memory(MemoryFields { used_kb: 1000, total_kb: 4000, used_pct: 25.0 }),
        SamplerOutput::Network(NetworkFields {
            interface: "eth0".to_string(),
            rx_mbps: 10.0, tx_mbps: 10.0, total_mbps: 20.0,
            rx_gbps: 0.01, tx_gbps: 0.01, total_gbps: 0.02,
            rx_pkts_s: 100.0, tx_pkts_s: 100.0, total_pkts_s: 200.0,
        }),
        SamplerOutput::Overhead(MonitorOverheadFields { monitor_iops: 1.0, monitor_throughput_mibs: 0.1 }),
        // Device is "pegged" on iostat util but aws_standard_iops sits at half baseline.
        SamplerOutput::Device(DeviceFields {
            device: "nvme0n1".to_string(),
            r_s: 500.0, w_s: 500.0, rkb_s: 4000.0, wkb_s: 4000.0,
            r_await_ms: 1.0, w_await_ms: 1.0, avg_queue_depth: 1.0,
            iostat_util_pct: 100.0, rrqm_s: 0.0, wrqm_s: 0.0, avg_rq_size_kb: 8.0,
            avg_io_kib: 8.0, total_iops: 1500.0, aws_standard_iops: 1500.0,
            read_throughput_mibs: 10.0, write_throughput_mibs: 10.0, total_throughput_mibs: 20.0,
            aws_standard_throughput_mibs: 20.0, volume_type: VolumeType::Ebs, availability: chainbench::models::Availability::Available,
        }),
        SamplerOutput::LocalNode(NodeHeightSample { height: 1000 + seq, health: HealthStatus::Healthy }),
        SamplerOutput::MainnetNode(NodeHeightSample { height: 1002 + seq, health: HealthStatus::Healthy }),
        SamplerOutput::LoadGen(LoadGenFields { current_qps: 1000, rpc_mean_latency_ms: 5.0, available: true }),
    ]
}

#[tokio::test]
async fn device_util_pegged_but_aws_iops_under_baseline_never_confirms() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let (aggregator, mut latest_row_rx) = Aggregator::new(config.clone(), &dir.path().join("run"), "test", false).unwrap();
    let (tx, rx) = mpsc::channel(64);
    let handle = tokio::spawn(aggregator.run(dir.path().join("run"), rx));

    for seq in 0..5u64 {
        for output in healthy_tick(seq) {
            tx.send((seq, output)).await.unwrap();
        }
    }
    drop(tx);
    handle.await.unwrap();

    let mut detector = BottleneckDetector::new(config, dir.path());
    let mut confirmed = false;
    for _ in 0..5 {
        latest_row_rx.changed().await.ok();
        let row = latest_row_rx.borrow().clone();
        if let Some(row) = row {
            if let TickOutcome::Confirmed(_) = detector.evaluate(&row, 4000, None, 4000) {
                confirmed = true;
            }
        }
    }
    assert!(!confirmed, "aws-standard IOPS at 50% of baseline must not confirm a device bottleneck even with util pegged at 100%");
}

#[tokio::test]
async fn sustained_rpc_quality_breach_confirms_after_k_levels() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.consecutive_confirmations_k = 3;
    let (aggregator, mut latest_row_rx) = Aggregator::new(config.clone(), &dir.path().join("run"), "test", false).unwrap();
    let (tx, rx) = mpsc::channel(64);
    let handle = tokio::spawn(aggregator.run(dir.path().join("run"), rx));

    for output in healthy_tick(0) {
        tx.send((0, output)).await.unwrap();
    }
    drop(tx);
    handle.await.unwrap();

    latest_row_rx.changed().await.ok();
    let row = latest_row_rx.borrow().clone().expect("aggregator should have published a row");

    let bad_level = LevelResult {
        qps: 5000,
        total_requests: 1000,
        successful_requests: 70,
        mean_latency_ms: 27_000.0,
        p99_latency_ms: None,
        error_rate_pct: 93.0,
    };

    let mut detector = BottleneckDetector::new(config, dir.path());
    let mut outcome = TickOutcome::Normal;
    for _ in 0..3 {
        outcome = detector.evaluate(&row, 5000, Some(&bad_level), 4500);
    }

    match outcome {
        TickOutcome::Confirmed(verdict) => {
            assert_eq!(verdict.classification, chainbench::models::BottleneckClassification::RpcQuality);
            assert_eq!(verdict.max_successful_qps, 4500);
            assert_eq!(verdict.bottleneck_qps, 5000);
        }
        _ => panic!("expected RPC-quality bottleneck confirmed after {} consecutive breaching levels", 3),
    }
}
