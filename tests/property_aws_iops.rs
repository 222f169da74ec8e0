use chainbench::models::{aws_standard_iops, is_unknown_f64, VolumeType};
use proptest::prelude::*;

proptest! {
    #[test]
    fn aws_iops_never_exceeds_total_for_ebs(total_iops in 0.0f64..100_000.0, avg_kib in 0.1f64..64.0) {
        let result = aws_standard_iops(total_iops, Some(avg_kib), VolumeType::Ebs);
        prop_assert!(result <= total_iops + 1e-6);
        prop_assert!(result >= 0.0);
    }

    #[test]
    fn aws_iops_saturates_at_total_once_avg_reaches_16kib(total_iops in 0.0f64..100_000.0, avg_kib in 16.0f64..256.0) {
        let result = aws_standard_iops(total_iops, Some(avg_kib), VolumeType::Ebs);
        prop_assert!((result - total_iops).abs() < 1e-6);
    }

    #[test]
    fn instance_store_always_passes_through(total_iops in 0.0f64..100_000.0, avg_kib in proptest::option::of(0.0f64..64.0)) {
        let result = aws_standard_iops(total_iops, avg_kib, VolumeType::InstanceStore);
        prop_assert!((result - total_iops).abs() < 1e-9);
    }

    #[test]
    fn unavailable_avg_size_is_never_silently_total_iops(total_iops in 1.0f64..100_000.0) {
        let result = aws_standard_iops(total_iops, None, VolumeType::Ebs);
        prop_assert!(is_unknown_f64(result));
    }
}
