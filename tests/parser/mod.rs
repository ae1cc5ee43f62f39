//! Parser module tests.

mod pattern_test;

/// Verify all public parser types are exported from the library.
#[test]
fn test_all_parser_types_exported() {
    use vrclog::parser::{
        parse_timestamp, ChainMode, ParseError, ParseResult, ParserChain, PatternError,
        PatternFile, PatternParser, RegexCache, VrcParser, MAX_PATTERN_FILE_SIZE,
        MAX_REGEX_LENGTH, SUPPORTED_PATTERN_VERSION,
    };

    let _ = ParserChain::new(ChainMode::First);
    let _ = VrcParser::new();
    let _ = RegexCache::new();
    let _ = ParseResult::no_match();
    assert!(parse_timestamp("2024.01.15 10:00:00 x").is_some());
    assert_eq!(SUPPORTED_PATTERN_VERSION, 1);
    assert_eq!(MAX_REGEX_LENGTH, 512);
    assert_eq!(MAX_PATTERN_FILE_SIZE, 1024 * 1024);

    let _: fn(&str) -> Result<PatternFile, PatternError> = PatternFile::from_yaml;
    let _: fn(PatternFile) -> Result<PatternParser, PatternError> = PatternParser::new;
    let _: fn(&str) -> ParseError = |msg| ParseError::custom(msg.to_string());
}
