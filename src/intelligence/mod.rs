pub mod dex_user;
pub mod evaluator;
pub mod new_wallet;
pub mod nft_trader;
pub mod scoring;
pub mod whale;

pub use dex_user::DexUserEvaluator;
pub use evaluator::{Evaluator, RuleDescription};
pub use new_wallet::NewWalletEvaluator;
pub use nft_trader::NftTraderEvaluator;
pub use whale::WhaleEvaluator;

/// The built-in evaluators, in registration order.
pub fn default_evaluators() -> Vec<Box<dyn Evaluator>> {
    vec![
        Box::new(WhaleEvaluator),
        Box::new(NftTraderEvaluator),
        Box::new(DexUserEvaluator),
        Box::new(NewWalletEvaluator),
    ]
}
