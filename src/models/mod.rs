pub mod label;
pub mod statistics;

pub use label::{
    index_labels, AddressLabel, Evidence, ExistingLabels, LabelCandidate, LabelKey, LabelKind,
};
pub use statistics::{
    canonical_address, AddressStatistics, ContractInteraction, TokenStandard, CONTRACT_INTERACTIONS,
    ETH_BALANCE, FIRST_TX_TIMESTAMP, TOKEN_INTERACTIONS, TOTAL_TX_COUNT,
};
