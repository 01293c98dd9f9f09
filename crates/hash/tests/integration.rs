//! Integration tests for hash crate

#[cfg(test)]
mod tests {
    use macfetch_hash::*;
    use tempfile::tempdir;
    use tokio::fs;

    #[tokio::test]
    async fn test_verify_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("BaseSystem.chunk");

        let data = b"verify this content";
        fs::write(&file_path, data).await.unwrap();

        let expected = Hash::from_data(data);
        assert!(verify_file(&file_path, &expected).await.unwrap());

        let wrong = Hash::from_data(b"something else");
        assert!(!verify_file(&file_path, &wrong).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_and_copy_matches_file_hash() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&source, &data).await.unwrap();

        let reader = fs::File::open(&source).await.unwrap();
        let mut copy = Vec::new();
        let (hash, len) = Hash::hash_and_copy(reader, &mut copy).await.unwrap();

        assert_eq!(len, data.len() as u64);
        assert_eq!(copy, data);
        assert_eq!(hash, Hash::hash_file(&source).await.unwrap());
    }

    #[test]
    fn test_streaming_hasher_equals_one_shot() {
        let data = b"chunk one|chunk two|chunk three";
        let mut hasher = Hash::hasher();
        for piece in data.chunks(7) {
            hasher.update(piece);
        }
        assert_eq!(hasher.finalize(), Hash::from_data(data));
    }

    #[test]
    fn test_hex_round_trip_and_rejects_bad_length() {
        let hash = Hash::from_data(b"abc");
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(Hash::from_hex("abcd").is_err());
    }
}
