#[cfg(test)]
mod tests {
    use beatsyncrs::cli::validate_device;
    use beatsyncrs::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn devices() -> Vec<String> {
        vec!["Launchpad Mini MIDI 1".to_string(), "FLUID Synth".to_string()]
    }

    #[test]
    fn test_args_without_flags() {
        let args = Args::parse_from(["test"]);
        assert_eq!(args.genre, None);
        assert_eq!(args.bpm, None);
        assert_eq!(args.input, None);
        assert_eq!(args.output, None);
        assert!(!args.device_list);
        assert!(!args.simulate);
        assert!(!args.no_ui);
    }

    #[test]
    fn test_args_with_devices_and_overrides() {
        let args = Args::parse_from([
            "test",
            "--input",
            "Launchpad",
            "--output",
            "FLUID",
            "--genre",
            "house",
            "--bpm",
            "124.5",
            "--config",
            "beatsync.toml",
            "--no-ui",
        ]);
        assert_eq!(args.input, Some("Launchpad".to_string()));
        assert_eq!(args.output, Some("FLUID".to_string()));
        assert_eq!(args.genre, Some("house".to_string()));
        assert_eq!(args.bpm, Some(124.5));
        assert_eq!(args.config, Some(PathBuf::from("beatsync.toml")));
        assert!(args.no_ui);
    }

    #[test]
    fn test_cli_overrides_win_over_settings() {
        let args = Args::parse_from(["test", "--genre", "hiphop", "--bpm", "95"]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);

        assert_eq!(settings.genre, "hiphop");
        assert_eq!(settings.preset().unwrap().tempo, 95.0);
    }

    #[test]
    fn test_valid_device_binding() {
        assert!(validate_device("Launchpad", &devices()).is_ok());
    }

    #[test]
    fn test_invalid_device_binding_lists_available_devices() {
        let error = validate_device("Nonexistent Device", &devices()).unwrap_err();
        assert!(error.contains("Nonexistent Device"));
        assert!(error.contains("  - FLUID Synth"));
    }
}
