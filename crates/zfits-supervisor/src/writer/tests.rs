//! Configuration set behaviour.

use std::collections::HashSet;

use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn scenario_config() -> WriterConfig {
    let mut config = WriterConfig::blank();
    let report = config.apply([
        ("output_dir", ConfigValue::from("/data/out")),
        ("input", ConfigValue::from(DEFAULT_INPUT)),
        ("loop", ConfigValue::Flag(true)),
        ("max_evts_per_file", ConfigValue::Integer(10_000)),
    ]);
    assert!(report.is_clean(), "unexpected report: {report:?}");
    config
}

#[rstest]
fn renders_set_fields_as_flags_and_values(scenario_config: WriterConfig) {
    let args = scenario_config.render_args();

    let expected: HashSet<&str> = [
        "--output_dir",
        "/data/out",
        "--input",
        "tcp://localhost:13581",
        "--loop",
        "--max_evts_per_file",
        "10000",
    ]
    .into_iter()
    .collect();
    assert_eq!(args.len(), expected.len());
    assert_eq!(args.iter().map(String::as_str).collect::<HashSet<_>>(), expected);
    assert!(
        args.windows(2)
            .any(|pair| pair[0] == "--max_evts_per_file" && pair[1] == "10000")
    );
}

#[rstest]
fn rendered_arguments_parse_back(scenario_config: WriterConfig) {
    let args = scenario_config.render_args();
    let parsed = WriterConfig::parse_args(&args).expect("parse rendered args");
    assert_eq!(parsed, scenario_config);
}

#[rstest]
fn default_config_round_trips_through_arguments() {
    let mut config = WriterConfig::default();
    config
        .set(WriterField::OutputDir, "/data/out".into())
        .expect("set output_dir");
    config.set(WriterField::Id, ConfigValue::Integer(-2)).expect("set id");

    let parsed = WriterConfig::parse_args(&config.render_args()).expect("parse args");

    assert_eq!(parsed, config);
    assert_eq!(parsed.comp_scheme(), Some(CompressionScheme::Zrice));
}

#[rstest]
fn false_flag_is_not_rendered(mut scenario_config: WriterConfig) {
    scenario_config
        .set(WriterField::Loop, ConfigValue::Flag(false))
        .expect("clear loop");
    let args = scenario_config.render_args();
    assert!(!args.iter().any(|arg| arg == "--loop"));
}

#[rstest]
fn suffix_and_run_number_flag_rendering() {
    let mut config = WriterConfig::blank();
    assert!(!config.render_args().iter().any(|arg| arg == "--suffix"));

    config
        .set(WriterField::Suffix, "pedestal".into())
        .expect("set suffix");
    let args = config.render_args();
    assert_eq!(args, ["--suffix", "pedestal"]);
    assert!(!args.iter().any(|arg| arg.contains("run_number_in_suffix")));
}

#[rstest]
fn unknown_keys_are_ignored_without_side_effects(scenario_config: WriterConfig) {
    let mut config = scenario_config.clone();

    let report = config.apply([
        ("trigger_mask", ConfigValue::Integer(3)),
        ("camera", ConfigValue::from("digicam")),
    ]);

    assert_eq!(report.ignored, ["trigger_mask", "camera"]);
    assert!(report.applied.is_empty());
    assert!(report.rejected.is_empty());
    assert_eq!(config, scenario_config);
}

#[rstest]
#[case(WriterField::MaxEvtsPerFile, ConfigValue::Flag(true))]
#[case(WriterField::Loop, ConfigValue::Integer(1))]
#[case(WriterField::CompScheme, ConfigValue::Integer(4))]
#[case(WriterField::OutputDir, ConfigValue::Flag(false))]
fn mismatched_types_are_rejected(#[case] field: WriterField, #[case] value: ConfigValue) {
    let mut config = WriterConfig::default();
    let before = config.clone();

    let report = config.apply([(field.as_str(), value)]);

    assert!(matches!(
        report.rejected.as_slice(),
        [ConfigError::TypeMismatch { field: rejected, .. }] if *rejected == field
    ));
    assert_eq!(config, before);
}

#[rstest]
#[case(WriterField::NumCompThreads, ConfigValue::Integer(-1))]
#[case(WriterField::MaxFileSize, ConfigValue::from("lots"))]
#[case(WriterField::CompScheme, ConfigValue::from("gzip"))]
fn invalid_values_are_rejected(#[case] field: WriterField, #[case] value: ConfigValue) {
    let mut config = WriterConfig::default();
    let error = config.set(field, value).expect_err("value must be refused");
    assert!(matches!(error, ConfigError::InvalidValue { field: rejected, .. } if rejected == field));
}

#[rstest]
fn rejected_keys_do_not_block_the_rest() {
    let mut config = WriterConfig::default();

    let report = config.apply([
        ("max_evts_per_file", ConfigValue::Flag(true)),
        ("evts_per_tile", ConfigValue::from("100")),
        ("comp_scheme", ConfigValue::from("ZLIB")),
    ]);

    assert_eq!(report.applied, [WriterField::EvtsPerTile, WriterField::CompScheme]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(config.get(WriterField::EvtsPerTile), Some(ConfigValue::Integer(100)));
    assert_eq!(config.comp_scheme(), Some(CompressionScheme::Zlib));
    assert_eq!(
        config.get(WriterField::MaxEvtsPerFile),
        Some(ConfigValue::Integer(10_000))
    );
}

#[rstest]
fn options_deserialise_from_json() {
    let options = parse_options(
        r#"{"output_dir": "/data/out", "loop": false, "max_evts_per_file": 500, "id": 4}"#,
    )
    .expect("parse options");

    let mut config = WriterConfig::default();
    let report = config.apply(options);

    assert!(report.is_clean());
    assert_eq!(config.output_dir().map(|dir| dir.as_str()), Some("/data/out"));
    assert!(!config.loops());
    assert_eq!(config.id(), Some(4));
    assert_eq!(
        config.get(WriterField::MaxEvtsPerFile),
        Some(ConfigValue::Integer(500))
    );
}

#[rstest]
#[case(r#"["output_dir"]"#)]
#[case(r#"{"output_dir": {"path": "/data"}}"#)]
#[case(r#"{"max_evts_per_file": 1.5}"#)]
fn malformed_options_are_refused(#[case] json: &str) {
    assert!(matches!(
        parse_options(json),
        Err(ConfigError::MalformedOptions { .. })
    ));
}

#[rstest]
fn run_number_rewrites_suffix_idempotently() {
    let mut config = WriterConfig::default();

    assert!(config.update_run_number(42));
    let once = config.clone();
    assert!(config.update_run_number(42));

    assert_eq!(config, once);
    assert_eq!(config.suffix(), "run_42");
    assert!(
        config
            .render_args()
            .windows(2)
            .any(|pair| pair[0] == "--suffix" && pair[1] == "run_42")
    );
}

#[rstest]
fn run_number_is_ignored_when_disabled() {
    let mut config = WriterConfig::default();
    let report = config.apply([
        ("suffix", ConfigValue::from("calibration")),
        ("run_number_in_suffix", ConfigValue::Flag(false)),
    ]);
    assert!(report.is_clean());

    assert!(!config.update_run_number(7));
    assert_eq!(config.suffix(), "calibration");
}

#[rstest]
fn validation_names_the_missing_field() {
    let mut config = WriterConfig::blank();
    assert_eq!(
        config.validate(),
        Err(ConfigError::MissingRequired {
            field: WriterField::OutputDir
        })
    );

    config
        .set(WriterField::OutputDir, "/data/out".into())
        .expect("set output_dir");
    assert_eq!(
        config.validate(),
        Err(ConfigError::MissingRequired {
            field: WriterField::Input
        })
    );
}

#[rstest]
#[case(&["--output_dir"], ConfigError::MissingValue { field: WriterField::OutputDir })]
#[case(&["--run_number_in_suffix"], ConfigError::UnknownArgument { argument: "--run_number_in_suffix".to_owned() })]
#[case(&["output_dir", "/data"], ConfigError::UnknownArgument { argument: "output_dir".to_owned() })]
fn malformed_arguments_are_rejected(#[case] args: &[&str], #[case] expected: ConfigError) {
    assert_eq!(WriterConfig::parse_args(args), Err(expected));
}
