// Integration tests for encoding negotiation
//
// These tests verify that the first supported preference wins and that the
// resolved capability descriptor carries the device-class chunk cadence.

use practice_audio::audio::format::default_preferences;
use practice_audio::audio::{
    CapabilityDescriptor, CapabilityProbe, DeviceClass, EncodingFormat, FormatNegotiator,
    Negotiation, StaticCapabilities, WavEncoderFactory,
};
use practice_audio::AudioError;
use std::time::Duration;

fn formats() -> Vec<EncodingFormat> {
    vec![
        EncodingFormat::new("audio/a", "a"),
        EncodingFormat::new("audio/b", "b"),
        EncodingFormat::new("audio/c", "c"),
    ]
}

#[test]
fn test_first_supported_preference_wins() {
    let probe = StaticCapabilities::new(["audio/b", "audio/c"]);

    let result = FormatNegotiator::negotiate(&formats(), &probe);

    assert_eq!(result, Negotiation::Supported(EncodingFormat::new("audio/b", "b")));
}

#[test]
fn test_preference_order_beats_probe_order() {
    let probe = StaticCapabilities::new(["audio/c", "audio/a"]);

    let result = FormatNegotiator::negotiate(&formats(), &probe);

    assert_eq!(result, Negotiation::Supported(EncodingFormat::new("audio/a", "a")));
}

#[test]
fn test_nothing_supported() {
    let probe = StaticCapabilities::new(["audio/flac"]);

    let result = FormatNegotiator::negotiate(&formats(), &probe);

    assert_eq!(result, Negotiation::Unsupported);
    assert_eq!(result.into_format(), Err(AudioError::FormatUnsupported));
}

#[test]
fn test_empty_preferences_are_unsupported() {
    let probe = StaticCapabilities::new(["audio/wav"]);
    assert_eq!(FormatNegotiator::negotiate(&[], &probe), Negotiation::Unsupported);
}

#[test]
fn test_wav_factory_negotiates_wav_from_defaults() {
    let factory = WavEncoderFactory::new(16000, 1);

    assert!(factory.supports("audio/wav"));
    assert!(!factory.supports("audio/webm;codecs=opus"));

    let format = FormatNegotiator::negotiate(&default_preferences(), &factory)
        .into_format()
        .unwrap();
    assert!(format.is_wav());
    assert_eq!(format.extension, "wav");
}

#[test]
fn test_descriptor_timeslice_follows_device_class() {
    let probe = StaticCapabilities::new(["audio/wav"]);
    let prefs = default_preferences();

    let desktop = CapabilityDescriptor::resolve(&prefs, &probe, DeviceClass::Desktop).unwrap();
    assert_eq!(desktop.timeslice, Duration::from_millis(100));
    assert_eq!(desktop.device_class, DeviceClass::Desktop);

    let constrained =
        CapabilityDescriptor::resolve(&prefs, &probe, DeviceClass::Constrained).unwrap();
    assert_eq!(constrained.timeslice, Duration::from_millis(1000));
    assert_eq!(constrained.format, desktop.format);
}

#[test]
fn test_descriptor_fails_without_format() {
    let probe = StaticCapabilities::new(Vec::<String>::new());

    let result = CapabilityDescriptor::resolve(&formats(), &probe, DeviceClass::Desktop);

    assert_eq!(result, Err(AudioError::FormatUnsupported));
}
