//! Property tests for merging with failing optional sources.

use node_bootstrap::prelude::*;
use node_bootstrap::sources::MemorySource;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct Layer {
    values: BTreeMap<String, i64>,
    fails: bool,
}

fn layer() -> impl Strategy<Value = Layer> {
    (
        prop::collection::btree_map(
            prop::sample::select(vec!["port", "timeout", "retries", "limits.max"]),
            any::<i64>(),
            0..4,
        ),
        any::<bool>(),
    )
        .prop_map(|(values, fails)| Layer {
            values: values.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            fails,
        })
}

/// Logging categories as they appear in real payloads: slashes, colons,
/// spaces and brackets, but no `.` nesting.
fn category_layer() -> impl Strategy<Value = Layer> {
    (
        prop::collection::btree_map("[A-Za-z0-9/ :#?_\\[\\]-]{1,12}", any::<i64>(), 0..4),
        any::<bool>(),
    )
        .prop_map(|(values, fails)| Layer {
            values: values
                .into_iter()
                .map(|(k, v)| (format!("logging.{}", k), v))
                .collect(),
            fails,
        })
}

fn resolve(layers: &[Layer]) -> Result<ConfigResolver> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut builder = ConfigResolver::builder();
    for (i, layer) in layers.iter().enumerate() {
        let mut source = MemorySource::new(format!("layer{}", i))
            .with_priority(i as i32 * 10)
            .optional(true);
        for (key, value) in &layer.values {
            source = source.with_value(key.clone(), *value);
        }
        if layer.fails {
            source.fail_with("unreachable");
        }
        builder = builder.with_source(source);
    }
    runtime.block_on(builder.build())
}

proptest! {
    #[test]
    fn optional_failures_never_fail_the_build(layers in prop::collection::vec(layer(), 1..6)) {
        let resolver = resolve(&layers).unwrap();
        let snapshot = resolver.snapshot();

        let mut expected = BTreeMap::new();
        for layer in layers.iter().filter(|l| !l.fails) {
            expected.extend(layer.values.clone());
        }

        prop_assert_eq!(snapshot.len(), expected.len());
        for (key, value) in &expected {
            prop_assert_eq!(snapshot.get::<i64>(key).unwrap(), *value);
        }
        prop_assert_eq!(
            snapshot.skipped().len(),
            layers.iter().filter(|l| l.fails).count()
        );
    }

    #[test]
    fn lower_keys_survive_partial_overlay(low in any::<i64>(), high in any::<i64>()) {
        let layers = vec![
            Layer {
                values: BTreeMap::from([("port".to_string(), low), ("timeout".to_string(), low)]),
                fails: false,
            },
            Layer {
                values: BTreeMap::from([("port".to_string(), high)]),
                fails: false,
            },
        ];
        let snapshot = resolve(&layers).unwrap().snapshot();

        prop_assert_eq!(snapshot.get::<i64>("port").unwrap(), high);
        prop_assert_eq!(snapshot.get::<i64>("timeout").unwrap(), low);
    }

    #[test]
    fn arbitrary_category_names_merge(layers in prop::collection::vec(category_layer(), 1..5)) {
        let snapshot = resolve(&layers).unwrap().snapshot();

        let mut expected = HashMap::new();
        for layer in layers.iter().filter(|l| !l.fails) {
            for (key, value) in &layer.values {
                expected.insert(key["logging.".len()..].to_string(), *value);
            }
        }

        if expected.is_empty() {
            prop_assert!(!snapshot.contains("logging"));
        } else {
            let logging: HashMap<String, i64> = snapshot.bind_section("logging").unwrap();
            prop_assert_eq!(logging, expected);
        }
    }
}
