//! Integration tests for types

#[cfg(test)]
mod tests {
    use macfetch_types::*;
    use std::path::PathBuf;
    use std::str::FromStr;

    #[test]
    fn test_product_tree_layout() {
        let product = Product::new("monterey", "12", ImageType::Recovery)
            .with_board("Mac-E43C1C25D4880AD6");
        assert!(product.supports("Mac-E43C1C25D4880AD6"));
        assert!(!product.supports("Mac-0000000000000000"));
        assert_eq!(product.relative_dir(), PathBuf::from("monterey/12/recovery"));
    }

    #[test]
    fn test_selection_defaults() {
        let mut selection = BoardSelection::new("Mac-E43C1C25D4880AD6");
        assert_eq!(selection.mlb(), DEFAULT_MLB);
        assert_eq!(selection.image_type(), ImageType::Recovery);
        assert_eq!(selection.os_type, OsType::Default);

        selection.diagnostics = true;
        selection.mlb = Some("C02912300SFG7CKJC".into());
        assert_eq!(selection.image_type(), ImageType::Diagnostics);
        assert_eq!(selection.mlb(), "C02912300SFG7CKJC");
    }

    #[test]
    fn test_selection_from_json_fills_defaults() {
        let selection: BoardSelection =
            serde_json::from_str(r#"{"board_id": "Mac-06F11F11946D27C5", "os_type": "latest"}"#)
                .unwrap();
        assert_eq!(selection.os_type, OsType::Latest);
        assert!(!selection.manual_override);
        assert_eq!(selection.client_id, None);
    }

    #[test]
    fn test_image_type_parse() {
        assert_eq!(ImageType::from_str("installer").unwrap(), ImageType::Installer);
        assert!(ImageType::from_str("firmware").is_err());
        assert_eq!(ImageType::Diagnostics.to_string(), "diagnostics");
    }
}
