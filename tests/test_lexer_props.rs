//! Property-based tests: the tokenizer and loader fail gracefully on any input.

use pdfa_oxide::lexer::{Token, Tokenizer};
use pdfa_oxide::object::Object;
use pdfa_oxide::parser::parse_object;
use pdfa_oxide::parser_config::ParserOptions;
use pdfa_oxide::Document;
use proptest::prelude::*;

fn pdf_name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9._-]{0,40}"
}

fn pdf_like_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![
            Just(b"<<".to_vec()),
            Just(b">>".to_vec()),
            Just(b"[".to_vec()),
            Just(b"]".to_vec()),
            Just(b"(".to_vec()),
            Just(b")".to_vec()),
            Just(b"\\".to_vec()),
            Just(b"/".to_vec()),
            Just(b"#".to_vec()),
            Just(b"%".to_vec()),
            Just(b" obj ".to_vec()),
            Just(b"stream\n".to_vec()),
            Just(b"endstream".to_vec()),
            "[0-9.+-]{1,6}".prop_map(|s| s.into_bytes()),
            "[a-zA-Z]{1,6}".prop_map(|s| s.into_bytes()),
            any::<u8>().prop_map(|b| vec![b]),
        ],
        0..64,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn tokenizer_terminates_on_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut last_end = 0;
        let mut steps = 0;
        for item in Tokenizer::new(&data) {
            steps += 1;
            prop_assert!(steps <= data.len() + 1);
            if let Ok(tok) = item {
                prop_assert!(tok.offset >= last_end);
                prop_assert!(!tok.raw.is_empty());
                last_end = tok.offset + tok.raw.len();
            }
        }
        prop_assert!(last_end <= data.len());
    }

    #[test]
    fn strict_tokenizer_terminates(data in pdf_like_bytes()) {
        let count = Tokenizer::new(&data).with_strict(true).count();
        prop_assert!(count <= data.len() + 1);
    }

    #[test]
    fn integers_tokenize_exactly(value in -1_000_000_000_000i64..1_000_000_000_000i64) {
        let text = value.to_string();
        let tokens: Vec<_> = Tokenizer::new(text.as_bytes()).collect::<Result<_, _>>().unwrap();
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(&tokens[0].token, &Token::Integer(value));
    }

    #[test]
    fn plain_names_tokenize_exactly(name in pdf_name_strategy()) {
        let text = format!("/{}", name);
        let mut tokens = Tokenizer::new(text.as_bytes());
        let tok = tokens.next().unwrap().unwrap();
        prop_assert_eq!(tok.token, Token::Name(name));
        prop_assert!(tokens.next().is_none());
    }

    #[test]
    fn literal_strings_parse_to_their_bytes(body in "[a-zA-Z0-9 ,.]{0,80}") {
        let text = format!("({})", body);
        let object = parse_object(text.as_bytes(), ParserOptions::strict()).unwrap();
        prop_assert_eq!(object, Object::String(body.into_bytes()));
    }

    #[test]
    fn loader_never_panics(data in pdf_like_bytes()) {
        let mut input = b"%PDF-1.7\n".to_vec();
        input.extend_from_slice(&data);
        let _ = Document::load(&input, &ParserOptions::lenient());
        let _ = Document::load(&input, &ParserOptions::strict());
    }
}
