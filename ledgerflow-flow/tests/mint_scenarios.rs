use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use ledgerflow_core::{
    build_create_proposal, build_move_proposal, sign, FinalizationOutcome, FixedClock,
    InMemoryKeyStore, LedgerKey, MemberName, Party, RejectionReason, SignedTransaction, Token,
    TokenError, TransactionId, UnreachableCause,
};
use ledgerflow_flow::{
    BackoffConfig, FlowConfig, FlowError, Finalizer, LocalNotaryClient, MemberInfo, MintRequest,
    MintTokenFlow, NotaryInfo, StaticMembership, StaticNotaryLookup, UpstreamFailure,
};
use ledgerflow_notary::NotaryService;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const ALICE: &str = "CN=Alice, O=R3, L=London, C=GB";
const BOB: &str = "CN=Bob, O=R3, L=New York, C=US";

struct Network {
    flow: MintTokenFlow,
    client: Arc<LocalNotaryClient>,
    keys: Arc<InMemoryKeyStore>,
    notary: Party,
    alice: Party,
    bob: Party,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 2, 16, 2, 41, 35).unwrap()
}

fn network(config: FlowConfig) -> Network {
    let mut keys = InMemoryKeyStore::new();
    let alice = Party::new(ALICE, keys.insert_seed([1; 32]));
    let bob = Party::new(BOB, keys.insert_seed([2; 32]));
    let notary = Party::new("CN=Notary, O=R3, L=London, C=GB", keys.insert_seed([9; 32]));
    let keys = Arc::new(keys);

    let clock = Arc::new(FixedClock::new(t0()));
    let service = NotaryService::new(notary.clone(), clock.clone());
    let client = Arc::new(LocalNotaryClient::new(Arc::new(service)));

    let membership = StaticMembership::new(MemberInfo::new(ALICE, vec![alice.ledger_key]))
        .with_member(MemberInfo::new(BOB, vec![bob.ledger_key]));

    let flow = MintTokenFlow::new(
        Arc::new(membership),
        Arc::new(StaticNotaryLookup::new(vec![NotaryInfo::from(&notary)])),
        keys.clone(),
        client.clone(),
        clock,
        config,
    )
    .unwrap();

    Network {
        flow,
        client,
        keys,
        notary,
        alice,
        bob,
    }
}

fn quick() -> FlowConfig {
    FlowConfig {
        finality_timeout_ms: 200,
        max_attempts: 3,
        backoff: BackoffConfig::Fixed { delay_ms: 1 },
        ..FlowConfig::default()
    }
}

fn mint_request(quantity: i64) -> MintRequest {
    MintRequest {
        asset_id: "USCA765248".to_string(),
        quantity,
        owner: MemberName::new(ALICE),
        issuer: MemberName::new(ALICE),
    }
}

fn move_to(net: &Network, minted: &SignedTransaction, new_owner: &Party) -> SignedTransaction {
    let input = minted.proposal().output_ref(0).unwrap();
    let proposal = build_move_proposal(
        net.notary.clone(),
        input,
        new_owner.clone(),
        t0(),
        t0() + ChronoDuration::days(1),
    )
    .unwrap();
    sign(proposal, &net.alice, net.keys.as_ref()).unwrap()
}

#[tokio::test]
async fn mint_with_reachable_notary_is_finalized() {
    let net = network(quick());
    let request = mint_request(25);

    let signed = net.flow.prepare(&request).unwrap();
    let proposal = signed.proposal();
    assert!(proposal.inputs().is_empty());
    assert_eq!(proposal.outputs().len(), 1);
    assert_eq!(proposal.outputs()[0].quantity(), 25);
    assert_eq!(proposal.outputs()[0].asset_id(), "USCA765248");
    assert_eq!(proposal.outputs()[0].owner(), &net.alice);
    assert_eq!(proposal.outputs()[0].issuer(), &net.alice);

    let id = net.flow.run(&request).await.unwrap();
    assert!(!id.is_empty());
    assert_eq!(id, signed.id().to_string());
}

#[tokio::test]
async fn unreachable_notary_then_retry_with_same_transaction() {
    let net = network(FlowConfig {
        max_attempts: 1,
        ..quick()
    });
    let signed = net.flow.prepare(&mint_request(25)).unwrap();

    // Notary is silent for longer than the finality timeout
    net.client.set_response_delay(Duration::from_secs(5));
    let err = net.flow.finalize(&signed, &[]).await.unwrap_err();
    assert_eq!(
        err,
        FlowError::UpstreamUnavailable(UpstreamFailure::Unreachable {
            cause: UnreachableCause::Timeout,
            transaction_id: signed.id(),
            attempts: 1,
        })
    );
    assert!(!err.outcome_known());

    // Retrying the identical signed transaction succeeds
    net.client.set_response_delay(Duration::ZERO);
    assert_eq!(net.flow.finalize(&signed, &[]).await.unwrap(), signed.id());
}

#[tokio::test]
async fn finalizer_reports_timeout_as_unreachable() {
    let net = network(quick());
    let signed = net.flow.prepare(&mint_request(25)).unwrap();
    let finalizer = Finalizer::new(net.client.clone(), Duration::from_millis(50));

    net.client.set_partitioned(true);
    assert!(matches!(
        finalizer.finalize(&signed, &[]).await,
        FinalizationOutcome::Unreachable {
            cause: UnreachableCause::Network(_)
        }
    ));

    net.client.set_partitioned(false);
    net.client.set_response_delay(Duration::from_secs(5));
    assert_eq!(
        finalizer.finalize(&signed, &[]).await,
        FinalizationOutcome::unreachable(UnreachableCause::Timeout)
    );
}

#[tokio::test]
async fn concurrent_spends_of_one_token_have_one_winner() {
    let net = network(quick());
    let minted = net.flow.prepare(&mint_request(25)).unwrap();
    net.flow.finalize(&minted, &[]).await.unwrap();

    let carol = Party::new("CN=Carol, O=R3, L=Paris, C=FR", LedgerKey::new([3; 32]));
    let spends = [move_to(&net, &minted, &net.bob), move_to(&net, &minted, &carol)];
    assert_ne!(spends[0].id(), spends[1].id());

    let finalizer = Finalizer::new(net.client.clone(), Duration::from_secs(1));
    let (a, b) = tokio::join!(
        finalizer.finalize(&spends[0], &[]),
        finalizer.finalize(&spends[1], &[])
    );

    let outcomes = [a, b];
    let finalized = outcomes.iter().filter(|o| o.is_finalized()).count();
    let conflicts: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            FinalizationOutcome::Rejected {
                reason: RejectionReason::DoubleSpend { conflicts },
            } => Some(conflicts.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(finalized, 1);
    assert_eq!(
        conflicts,
        vec![vec![minted.proposal().output_ref(0).unwrap().state_ref]]
    );
}

#[tokio::test]
async fn spending_a_consumed_token_is_rejected_without_retry() {
    let net = network(quick());
    let minted = net.flow.prepare(&mint_request(25)).unwrap();
    net.flow.finalize(&minted, &[]).await.unwrap();

    let to_bob = move_to(&net, &minted, &net.bob);
    net.flow
        .finalize(&to_bob, &[net.bob.clone()])
        .await
        .unwrap();

    let carol = Party::new("CN=Carol, O=R3, L=Paris, C=FR", LedgerKey::new([3; 32]));
    let to_carol = move_to(&net, &minted, &carol);
    let before = net.client.submissions();
    let err = net.flow.finalize(&to_carol, &[]).await.unwrap_err();

    assert!(matches!(
        err,
        FlowError::Rejected {
            reason: RejectionReason::DoubleSpend { .. },
            ..
        }
    ));
    assert!(err.outcome_known());
    assert_eq!(net.client.submissions(), before + 1);

    let record = net
        .client
        .notary()
        .finalized_transaction(&to_bob.id())
        .unwrap()
        .unwrap();
    assert_eq!(record.observers, vec![net.bob.clone()]);
}

#[test]
fn required_signatories_are_the_union_of_command_signatories() {
    let net = network(quick());
    let alice = net.alice.clone();
    let bob = net.bob.clone();

    for participants in [
        vec![alice.clone()],
        vec![alice.clone(), bob.clone()],
        vec![bob.clone(), alice.clone(), bob.clone(), alice.clone()],
    ] {
        let expected: BTreeSet<Party> = participants.iter().cloned().collect();
        let token = Token::new("USCA765248", 10, alice.clone(), alice.clone(), participants).unwrap();
        let proposal = build_create_proposal(
            net.notary.clone(),
            token,
            t0(),
            t0() + ChronoDuration::days(1),
        )
        .unwrap();

        let union: BTreeSet<Party> = proposal
            .commands()
            .iter()
            .flat_map(|c| c.signatories.iter().cloned())
            .collect();
        assert_eq!(proposal.required_signatories(), &union);
        assert_eq!(proposal.required_signatories(), &expected);
    }
}

#[test]
fn re_signing_an_unchanged_proposal_is_byte_identical() {
    let net = network(quick());
    let first = net.flow.prepare(&mint_request(25)).unwrap();
    let second = sign(first.proposal().clone(), &net.alice, net.keys.as_ref()).unwrap();

    assert_eq!(
        first.signatures()[&net.alice].bytes,
        second.signatures()[&net.alice].bytes
    );
    assert_eq!(first.id(), second.id());
}

#[tokio::test]
async fn non_positive_quantities_are_invalid_tokens() {
    let net = network(quick());
    for quantity in [0, -1, -25, i64::MIN] {
        let err = net.flow.run(&mint_request(quantity)).await.unwrap_err();
        assert_eq!(
            err,
            FlowError::InvalidToken(TokenError::NonPositiveQuantity(quantity))
        );
    }
    for quantity in [1, 25, i64::MAX] {
        let signed = net.flow.prepare(&mint_request(quantity)).unwrap();
        assert!(signed.proposal().outputs()[0]
            .participants()
            .contains(&net.alice));
    }
    assert_eq!(net.client.submissions(), 0);
}

#[tokio::test]
async fn request_boundary_returns_id_or_error_detail() {
    let net = network(quick());

    let id = net
        .flow
        .call(&format!(
            r#"{{"assetId":"USCA765248","quantity":25,"owner":"{}","issuer":"{}"}}"#,
            ALICE, ALICE
        ))
        .await
        .unwrap();
    assert!(id.parse::<TransactionId>().is_ok());

    net.client.set_partitioned(true);
    let detail = net
        .flow
        .call(&format!(
            r#"{{"assetId":"USCA765249","quantity":5,"owner":"{}","issuer":"{}"}}"#,
            ALICE, ALICE
        ))
        .await
        .unwrap_err();
    assert_eq!(detail.kind, "UpstreamUnavailable");
}
