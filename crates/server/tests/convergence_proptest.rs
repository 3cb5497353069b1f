//! Property-based convergence: whatever mix of optimistic calls, foreign
//! writes and reconnects happens, a quiet client view equals the store.

mod common;

use common::*;
use proptest::prelude::*;
use serde_json::json;
use strand_core::{DocumentId, FieldDelta, Value};
use strand_storage::DocumentStore;

#[derive(Clone, Debug)]
enum Step {
    Insert(String),
    Toggle(usize),
    Delete(usize),
    ForeignEdit(usize, String),
    ForeignDelete(usize),
    Reconnect,
    Flush,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        "[a-z]{0,4}".prop_map(Step::Insert),
        (0usize..16).prop_map(Step::Toggle),
        (0usize..16).prop_map(Step::Delete),
        (0usize..16, "[a-z]{1,4}").prop_map(|(i, text)| Step::ForeignEdit(i, text)),
        (0usize..16).prop_map(Step::ForeignDelete),
        Just(Step::Reconnect),
        Just(Step::Flush),
    ]
}

fn pick(ids: &[DocumentId], index: usize) -> Option<DocumentId> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()].clone())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn view_converges_to_store(steps in prop::collection::vec(step(), 1..40)) {
        let store = seeded_store(4);
        let mut hub = tasks_hub(store.clone());
        let mut peer = Peer::open(&mut hub, None);
        peer.client.subscribe("tasks", Value::Null);
        peer.flush(&mut hub);

        for step in steps {
            let view_ids: Vec<DocumentId> = view_contents(&peer.client).into_keys().collect();
            let store_ids: Vec<DocumentId> = store_contents(&store).into_keys().collect();
            match step {
                Step::Insert(text) => {
                    peer.client.call("tasks.insert", json!({"text": text}));
                }
                Step::Toggle(i) => {
                    if let Some(id) = pick(&view_ids, i) {
                        let checked = peer
                            .client
                            .get(&id)
                            .and_then(|doc| doc.get("isChecked").and_then(Value::as_bool))
                            .unwrap_or(false);
                        peer.client.call(
                            "tasks.toggleChecked",
                            json!({"_id": id.as_str(), "isChecked": checked}),
                        );
                    }
                }
                Step::Delete(i) => {
                    if let Some(id) = pick(&view_ids, i) {
                        peer.client.call("tasks.delete", json!({"_id": id.as_str()}));
                    }
                }
                Step::ForeignEdit(i, text) => {
                    if let Some(id) = pick(&store_ids, i) {
                        store.update(&id, &FieldDelta::new().with_set("text", text)).unwrap();
                    }
                }
                Step::ForeignDelete(i) => {
                    if let Some(id) = pick(&store_ids, i) {
                        store.remove(&id).unwrap();
                    }
                }
                Step::Reconnect => {
                    peer.drop_connection(&mut hub);
                    peer.reconnect(&mut hub);
                }
                Step::Flush => peer.flush(&mut hub),
            }
        }

        peer.flush(&mut hub);
        prop_assert_eq!(view_contents(&peer.client), store_contents(&store));
        prop_assert_eq!(peer.client.cache().pending_patches(), 0);
    }
}
