#[cfg(test)]
mod tests {
    use crate::segment::{SegmentError, SegmentStore};
    use std::fs;
    use tempfile::TempDir;

    fn store() -> (TempDir, SegmentStore) {
        let tmp = TempDir::new().unwrap();
        let store = SegmentStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn write_sorted_produces_record_lines() {
        let (_tmp, store) = store();
        store
            .write_sorted("segment-1", vec![("a", "1"), ("b", "2"), ("c", "3")])
            .unwrap();

        let contents = fs::read_to_string(store.path("segment-1")).unwrap();
        assert_eq!(contents, "a,1\nb,2\nc,3\n");
        assert_eq!(store.size("segment-1").unwrap(), contents.len() as u64);
    }

    #[test]
    fn scan_yields_entries_with_offsets_and_lengths() {
        let (_tmp, store) = store();
        store
            .write_sorted("segment-1", vec![("abc", "cba"), ("def", "fed")])
            .unwrap();

        let entries: Vec<_> = store
            .scan("segment-1")
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "abc");
        assert_eq!(entries[0].value, "cba");
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[0].len, 8);
        assert_eq!(entries[1].key, "def");
        assert_eq!(entries[1].offset, 8);
    }

    #[test]
    fn scan_from_starts_mid_file() {
        let (_tmp, store) = store();
        store
            .write_sorted("segment-1", vec![("a", "1"), ("b", "2"), ("c", "3")])
            .unwrap();

        // Each line is 4 bytes; start at the second record.
        let entries: Vec<_> = store
            .scan_from("segment-1", 4)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(entries[0].offset, 4);
    }

    #[test]
    fn read_at_returns_the_line_at_offset() {
        let (_tmp, store) = store();
        store
            .write_sorted("segment-1", vec![("abc", "cba"), ("def", "fed")])
            .unwrap();

        assert_eq!(
            store.read_at("segment-1", 8).unwrap(),
            ("def".to_string(), "fed".to_string())
        );
    }

    #[test]
    fn writer_append_reports_line_start_offsets() {
        let (_tmp, store) = store();
        let mut writer = store.create("segment-1").unwrap();

        assert_eq!(writer.append("abc", "cba").unwrap(), 0);
        assert_eq!(writer.offset(), 8);
        assert_eq!(writer.append("def", "fed").unwrap(), 8);
        writer.finish().unwrap();

        assert_eq!(store.size("segment-1").unwrap(), 16);
    }

    #[test]
    fn corrupt_line_surfaces_as_error() {
        let (_tmp, store) = store();
        fs::write(store.path("segment-1"), "good,line\nbroken line\n").unwrap();

        let results: Vec<_> = store.scan("segment-1").unwrap().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SegmentError::Corrupt(_))));
    }

    #[test]
    fn delete_removes_the_file() {
        let (_tmp, store) = store();
        store.write_sorted("segment-1", vec![("a", "1")]).unwrap();
        assert!(store.exists("segment-1"));

        store.delete("segment-1").unwrap();
        assert!(!store.exists("segment-1"));
    }

    #[test]
    fn rename_moves_the_file() {
        let (_tmp, store) = store();
        store.write_sorted("segment-3", vec![("a", "1")]).unwrap();

        store.rename("segment-3", "segment-1").unwrap();
        assert!(!store.exists("segment-3"));
        assert!(store.exists("segment-1"));
        assert_eq!(
            fs::read_to_string(store.path("segment-1")).unwrap(),
            "a,1\n"
        );
    }

    #[test]
    fn rename_to_same_name_is_a_noop() {
        let (_tmp, store) = store();
        store.write_sorted("segment-1", vec![("a", "1")]).unwrap();
        store.rename("segment-1", "segment-1").unwrap();
        assert!(store.exists("segment-1"));
    }

    #[test]
    fn promote_temp_replaces_the_original() {
        let (_tmp, store) = store();
        store.write_sorted("segment-1", vec![("old", "old")]).unwrap();

        let mut writer = store.create_temp("segment-1").unwrap();
        writer.append("new", "new").unwrap();
        writer.finish().unwrap();
        store.promote_temp("segment-1").unwrap();

        assert_eq!(
            fs::read_to_string(store.path("segment-1")).unwrap(),
            "new,new\n"
        );
        assert!(!store.temp_path("segment-1").exists());
    }

    #[test]
    fn remove_temp_files_sweeps_orphans() {
        let (_tmp, store) = store();
        store.write_sorted("segment-1", vec![("a", "1")]).unwrap();
        fs::write(store.temp_path("segment-1"), "partial").unwrap();
        fs::write(store.temp_path("segment-9"), "partial").unwrap();

        let removed = store.remove_temp_files().unwrap();
        assert_eq!(removed, 2);
        assert!(store.exists("segment-1"));
        assert!(!store.temp_path("segment-1").exists());
    }
}
