use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash};
use serde_json::{json, Value};
use tpsbench_core::{
    resolver::BlockResolver,
    rpc::mock::{MockConnector, MockReply},
    spammer::{SignedTx, TxState, TxSubmitter},
};

fn signed(nonce: u64) -> SignedTx {
    SignedTx {
        nonce,
        raw: Bytes::from(vec![0xf8, nonce as u8]),
        hash: TxHash::with_last_byte(nonce as u8),
        sender: Address::ZERO,
    }
}

fn hash(i: u64) -> TxHash {
    TxHash::left_padding_from(&i.to_be_bytes())
}

fn mined(req_params: &Value) -> Option<MockReply> {
    Some(MockReply::Result(json!({
        "hash": req_params[0],
        "blockNumber": "0x2a",
    })))
}

#[tokio::test]
async fn underpriced_nonce_is_dropped_and_never_resent() {
    let node = MockConnector::new(|req| {
        if req.params[0] == json!("0xf806") {
            Some(MockReply::error("transaction underpriced"))
        } else {
            Some(MockReply::Result(json!("0x01")))
        }
    });

    let report = TxSubmitter::new(node.clone(), Address::ZERO, [signed(5), signed(6), signed(7)])
        .submit_all()
        .await;

    assert_eq!(report.states[&5], TxState::Accepted);
    assert_eq!(
        report.states[&6],
        TxState::Dropped {
            reason: "transaction underpriced".to_owned()
        }
    );
    assert_eq!(report.states[&7], TxState::Accepted);

    let sends_of_6 = node
        .requests()
        .iter()
        .filter(|r| r.params[0] == json!("0xf806"))
        .count();
    assert_eq!(sends_of_6, 1);
    assert_eq!(report.sends, 3);
    assert!(report.gave_up.is_none());
}

#[tokio::test(start_paused = true)]
async fn lookups_are_split_into_bounded_batches() {
    let node = MockConnector::new(|req| mined(&req.params));
    let hashes = (0..81).map(hash).collect::<Vec<_>>();

    let record = BlockResolver::new(node.clone())
        .resolve(&hashes)
        .await
        .unwrap();

    assert!(record.complete);
    assert_eq!(record.batches, vec![80, 1]);
    assert_eq!(record.resolved.len(), 81);
    assert!(record.resolved.values().all(|n| *n == 42));

    let requests = node.requests();
    assert_eq!(requests.len(), 81);
    assert!(requests
        .iter()
        .all(|r| r.method == "eth_getTransactionByHash" && r.connection == 0));
}

#[tokio::test(start_paused = true)]
async fn reconnect_resends_only_unresolved_hashes() {
    let node = MockConnector::new(|req| mined(&req.params)).close_after(0, 40);
    let hashes = (0..80).map(hash).collect::<Vec<_>>();

    let record = BlockResolver::new(node.clone())
        .with_stagger(Duration::ZERO)
        .resolve(&hashes)
        .await
        .unwrap();

    assert!(record.complete);
    assert_eq!(record.resolved.len(), 80);
    assert_eq!(record.batches, vec![80, 40]);

    let first = node
        .requests_on(0)
        .iter()
        .map(|r| r.params[0].clone())
        .collect::<Vec<_>>();
    let second = node
        .requests_on(1)
        .iter()
        .map(|r| r.params[0].clone())
        .collect::<Vec<_>>();
    assert_eq!(first.len(), 40);
    assert_eq!(second.len(), 40);
    assert!(second.iter().all(|h| !first.contains(h)));
    assert_eq!(second, hashes[40..].iter().map(|h| json!(h)).collect::<Vec<_>>());
}
