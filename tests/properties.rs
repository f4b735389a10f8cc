mod common;

use chrono::Duration;
use proptest::prelude::*;
use rust_decimal::Decimal;

use addrlabel::config::Thresholds;
use addrlabel::intelligence::{Evaluator, NewWalletEvaluator, NftTraderEvaluator, WhaleEvaluator};
use addrlabel::models::{AddressStatistics, ContractInteraction, ExistingLabels, LabelKind};

use common::*;

fn arb_statistics() -> impl Strategy<Value = AddressStatistics> {
    (
        any::<u16>(),
        prop::option::of(0i64..200_000),
        0u64..300,
        0u64..300,
        prop::option::of((0usize..2, 1u64..120)),
        prop::option::of(0i64..24 * 120),
    )
        .prop_map(|(id, balance, erc721, erc20, dex, age_hours)| {
            let mut stats = AddressStatistics::new(format!("0x{id:040x}"));
            stats.eth_balance = balance.map(Decimal::from);
            if erc721 > 0 {
                stats.token_interactions.insert("ERC-721".into(), erc721);
            }
            if erc20 > 0 {
                stats.token_interactions.insert("ERC-20".into(), erc20);
            }
            if let Some((router, count)) = dex {
                let router = if router == 0 { UNISWAP_V2 } else { SUSHISWAP };
                stats
                    .contract_interactions
                    .push(ContractInteraction::new(router, count));
            }
            stats.first_tx_timestamp = age_hours.map(|h| run_time() - Duration::hours(h));
            stats
        })
}

proptest! {
    #[test]
    fn test_confidence_always_in_unit_range(
        snapshot in prop::collection::vec(arb_statistics(), 0..60)
    ) {
        let output = default_engine().run(snapshot, &ExistingLabels::new(), run_time());
        for label in &output.labels {
            prop_assert!((0.0..=1.0).contains(&label.confidence), "{}", label);
        }
    }

    #[test]
    fn test_runs_are_deterministic(
        snapshot in prop::collection::vec(arb_statistics(), 0..60)
    ) {
        let engine = default_engine();
        let first = engine.run(snapshot.clone(), &ExistingLabels::new(), run_time());
        let second = engine.run(snapshot, &ExistingLabels::new(), run_time());
        prop_assert_eq!(first.labels, second.labels);
        prop_assert_eq!(first.summary, second.summary);
    }

    #[test]
    fn test_at_most_one_label_per_key(
        snapshot in prop::collection::vec(arb_statistics(), 0..60)
    ) {
        let output = default_engine().run(snapshot, &ExistingLabels::new(), run_time());
        let mut keys: Vec<_> = output.labels.iter().map(|l| l.key()).collect();
        let total = keys.len();
        keys.dedup();
        prop_assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_whale_confidence_is_monotonic(
        threshold in 1i64..100_000,
        low_extra in 0i64..2_000_000,
        step in 0i64..2_000_000,
    ) {
        let t = Decimal::from(threshold);
        let low = WhaleEvaluator::confidence(t + Decimal::from(low_extra), t);
        let high = WhaleEvaluator::confidence(t + Decimal::from(low_extra + step), t);
        prop_assert!(low <= high);
    }

    #[test]
    fn test_whale_threshold_boundary(threshold in 1i64..1_000_000) {
        let thresholds = Thresholds {
            min_eth_balance_whale: Decimal::from(threshold),
            ..Thresholds::default()
        };

        let at = make_whale("0xaa", threshold);
        let below = make_whale("0xbb", threshold - 1);

        let fired = WhaleEvaluator.evaluate(&at, &thresholds, run_time()).unwrap();
        prop_assert_eq!(fired.map(|c| c.confidence), Some(0.5));
        prop_assert!(WhaleEvaluator.evaluate(&below, &thresholds, run_time()).unwrap().is_none());
    }

    #[test]
    fn test_new_wallet_confidence_never_increases_with_age(
        lookback in 1u32..365,
        age in 0.0f64..365.0,
        step in 0.0f64..365.0,
    ) {
        let younger = NewWalletEvaluator::confidence(age, lookback);
        let older = NewWalletEvaluator::confidence(age + step, lookback);
        prop_assert!(older <= younger);
    }

    #[test]
    fn test_nft_confidence_grows_with_ratio_and_activity(
        ratio in 0.7f64..=1.0,
        extra_ratio in 0.0f64..0.3,
        total in 1u64..500,
        extra_total in 0u64..500,
    ) {
        let base = NftTraderEvaluator::confidence(ratio, total);
        prop_assert!(base <= NftTraderEvaluator::confidence((ratio + extra_ratio).min(1.0), total));
        prop_assert!(base <= NftTraderEvaluator::confidence(ratio, total + extra_total));
    }
}

#[test]
fn test_new_wallet_boundary_scores_near_baseline() {
    let thresholds = Thresholds::default();
    let stats = with_age(make_whale("0xcc", 0), Duration::days(30));
    let candidate = NewWalletEvaluator
        .evaluate(&stats, &thresholds, run_time())
        .unwrap()
        .expect("a 30 day old wallet is still new");

    assert_eq!(candidate.kind, LabelKind::NewWallet);
    assert!((candidate.confidence - 0.1).abs() < 1e-9);
}
