//! Resolver Property Tests
//!
//! Resolution is total and its precedence rules hold for whole families of
//! payloads, not just the hand-picked cases in the unit tests.

use ar_core::{MatchKind, ModelCatalog, ModelResolver};
use proptest::prelude::*;

fn resolver() -> ModelResolver {
    ModelResolver::new(ModelCatalog::builtin())
}

fn catalog_keys() -> Vec<String> {
    ModelCatalog::builtin().all().map(|m| m.key.clone()).collect()
}

#[test]
fn test_missing_and_empty_resolve_to_default() {
    let resolver = resolver();
    let default_key = resolver.catalog().default_model().key.clone();
    assert_eq!(resolver.resolve(None).key, default_key);
    assert_eq!(resolver.resolve(Some("")).key, default_key);
}

#[test]
fn test_garbage_resolves_to_default() {
    let resolver = resolver();
    let resolution = resolver.resolve_with_reason(Some("garbage-text-not-matching-anything"));
    assert_eq!(resolution.matched_by, MatchKind::Default);
    assert_eq!(resolution.descriptor.key, "MODEL_CHURCH_01");
}

#[test]
fn test_url_model_parameter_selects_second_model() {
    let resolver = resolver();
    let resolution =
        resolver.resolve_with_reason(Some("https://example.com/?model=MODEL_CHURCH_02"));
    assert_eq!(resolution.matched_by, MatchKind::UrlModelKey);
    assert_eq!(resolution.descriptor.key, "MODEL_CHURCH_02");
}

#[test]
fn test_custom_catalog_aliases() {
    let mut config = ModelCatalog::builtin().to_config();
    config.numeric_aliases = vec![("7".into(), "MODEL_CHURCH_03".into())];
    config.default_key = "MODEL_CHURCH_02".into();
    let resolver = ModelResolver::new(ModelCatalog::from_config(config).expect("valid"));

    assert_eq!(resolver.resolve(Some("https://x.test/?code=7")).key, "MODEL_CHURCH_03");
    assert_eq!(resolver.resolve(Some("https://x.test/?code=1")).key, "MODEL_CHURCH_02");
    assert_eq!(resolver.resolve(None).key, "MODEL_CHURCH_02");
}

proptest! {
    #[test]
    fn prop_exact_key_always_wins(index in 0usize..3) {
        let keys = catalog_keys();
        let resolver = resolver();
        let resolution = resolver.resolve_with_reason(Some(&keys[index]));
        prop_assert_eq!(&resolution.descriptor.key, &keys[index]);
        prop_assert_eq!(resolution.matched_by, MatchKind::ExactKey);
    }

    #[test]
    fn prop_code_2_selects_second_model(
        host in "[a-z]{1,12}\\.(com|org|kr)",
        path in "(/[a-z0-9]{1,8}){0,3}",
        before in prop::collection::vec("[a-bd-z]{1,6}=[a-z0-9]{0,6}", 0..3),
        model in "[A-Z_0-9]{0,16}",
    ) {
        let mut query: Vec<String> = before;
        query.push("code=2".to_string());
        query.push(format!("model={model}"));
        let url = format!("https://{host}{path}/?{}", query.join("&"));

        let resolver = resolver();
        let resolution = resolver.resolve_with_reason(Some(&url));
        prop_assert_eq!(resolution.descriptor.key.as_str(), "MODEL_CHURCH_02");
        prop_assert_eq!(resolution.matched_by, MatchKind::UrlCodeAlias);
    }

    #[test]
    fn prop_unmatched_text_resolves_to_default(payload in "[a-bd-z \\-]{1,40}") {
        // no 'c', no digits, no ':' means no key, alias, URL or id can match
        let resolver = resolver();
        let resolution = resolver.resolve_with_reason(Some(&payload));
        prop_assert_eq!(resolution.matched_by, MatchKind::Default);
        prop_assert_eq!(resolution.descriptor.key.as_str(), "MODEL_CHURCH_01");
    }

    #[test]
    fn prop_resolution_is_total(payload in any::<String>()) {
        let resolver = resolver();
        let key = resolver.resolve(Some(&payload)).key.clone();
        prop_assert!(resolver.catalog().get(&key).is_some());
    }

    #[test]
    fn prop_padded_alias_resolves(index in 1usize..=3, left in " {0,3}", right in "[ \\t\\n]{0,3}") {
        let payload = format!("{left}{index}{right}");
        let resolver = resolver();
        let resolution = resolver.resolve_with_reason(Some(&payload));
        let keys = catalog_keys();
        prop_assert_eq!(&resolution.descriptor.key, &keys[index - 1]);
    }
}
