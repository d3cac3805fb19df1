#[cfg(test)]
mod tests {
    use crate::segment::{SegmentError, increment, renormalise, split_name};

    #[test]
    fn split_name_extracts_basename_and_suffix() {
        assert_eq!(split_name("segment-1").unwrap(), ("segment", 1));
        assert_eq!(split_name("segment-42").unwrap(), ("segment", 42));
    }

    #[test]
    fn split_name_uses_last_dash() {
        assert_eq!(split_name("my-db-segment-7").unwrap(), ("my-db-segment", 7));
    }

    #[test]
    fn split_name_rejects_bad_ids() {
        for id in ["segment", "segment-", "segment-zero", "-1", "segment-0"] {
            assert!(
                matches!(split_name(id), Err(SegmentError::InvalidName(_))),
                "expected {id:?} to be rejected"
            );
        }
    }

    #[test]
    fn increment_steps_the_suffix() {
        assert_eq!(increment("segment-1").unwrap(), "segment-2");
        assert_eq!(increment("segment-99").unwrap(), "segment-100");
        assert_eq!(increment("my-db-segment-7").unwrap(), "my-db-segment-8");
    }

    #[test]
    fn renormalise_renumbers_in_order() {
        let ids = vec![
            "segment-1".to_string(),
            "segment-3".to_string(),
            "segment-7".to_string(),
        ];
        assert_eq!(
            renormalise(&ids).unwrap(),
            vec!["segment-1", "segment-2", "segment-3"]
        );
    }

    #[test]
    fn renormalise_of_empty_list_is_empty() {
        assert!(renormalise(&[]).unwrap().is_empty());
    }

    #[test]
    fn renormalise_keeps_each_basename() {
        let ids = vec!["alpha-5".to_string(), "beta-9".to_string()];
        assert_eq!(renormalise(&ids).unwrap(), vec!["alpha-1", "beta-2"]);
    }
}
