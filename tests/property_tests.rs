//! Property tests for activation and ordering

mod common;

use common::*;
use proptest::prelude::*;
use serde_json::json;

use require_loader::loader::Dependency;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However requests overlap, each resource is activated exactly once and
    /// every request sees its exports in request order.
    #[test]
    fn prop_each_resource_activates_once(
        requests in prop::collection::vec(prop::collection::vec(0usize..5, 0..5), 1..8)
    ) {
        let rt = runtime();
        rt.block_on(async {
            let mut activator = RecordingActivator::new().gated();
            for i in 0..5 {
                let mut exports = serde_json::Map::new();
                exports.insert(format!("R{}", i), json!(i));
                activator = activator.with_resource(&format!("r{}", i), exports.into());
            }
            let loader = spawn_loader(activator.clone());

            let receivers: Vec<_> = requests
                .iter()
                .map(|request| {
                    let dependencies = request
                        .iter()
                        .map(|i| Dependency::guarded(&format!("R{}", i), &format!("r{}", i)).unwrap())
                        .collect();
                    loader.submit(dependencies, vec![]).unwrap()
                })
                .collect();
            activator.release(5);

            for (request, rx) in requests.iter().zip(receivers) {
                let resolution = rx.await.unwrap().unwrap();
                let expected: Vec<_> = request.iter().map(|i| json!(i)).collect();
                prop_assert_eq!(resolution.exports, expected);
            }
            for i in 0..5 {
                let name = format!("r{}", i);
                let wanted = requests.iter().any(|r| r.contains(&i));
                prop_assert_eq!(activator.call_count(&name), usize::from(wanted));
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_arguments_precede_exports(
        args in prop::collection::vec(any::<i64>(), 0..6)
    ) {
        let rt = runtime();
        rt.block_on(async {
            let activator = RecordingActivator::new().with_resource("lib", json!({"Lib": "ok"}));
            let loader = spawn_loader(activator);
            let forwarded: Vec<_> = args.iter().map(|a| json!(a)).collect();

            let resolution = loader.resolve(deps(&["Lib:lib"]), forwarded.clone()).await.unwrap();

            let mut expected = forwarded;
            expected.push(json!("ok"));
            prop_assert_eq!(resolution.arguments(), expected);
            Ok(())
        })?;
    }
}
