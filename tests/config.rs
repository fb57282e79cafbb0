use framefetch::{Config, SourceKind};

#[test]
fn test_environment_overrides_defaults() {
    std::env::set_var("FRAMEFETCH_PREFETCH__CAPACITY", "12");
    std::env::set_var("FRAMEFETCH_PREFETCH__PIN_CORE", "1");
    std::env::set_var("FRAMEFETCH_SOURCE__KIND", "jpeg_sequence");

    let config = Config::load(None).unwrap();
    assert_eq!(config.prefetch.capacity, 12);
    assert_eq!(config.prefetch.pin_core, Some(1));
    assert_eq!(config.source.kind, SourceKind::JpegSequence);
    assert_eq!(config.prefetch.thread_name, "framefetch-decode");

    std::env::remove_var("FRAMEFETCH_PREFETCH__CAPACITY");
    std::env::remove_var("FRAMEFETCH_PREFETCH__PIN_CORE");
    std::env::remove_var("FRAMEFETCH_SOURCE__KIND");
}
