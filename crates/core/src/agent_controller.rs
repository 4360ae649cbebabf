use std::ops::Range;

use alloy::{
    primitives::Address,
    signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner},
};

use crate::Result;

/// Accounts derived from one mnemonic at `m/44'/60'/0'/0/{i}`.
#[derive(Clone, Debug, Default)]
pub struct SignerStore {
    pub signers: Vec<PrivateKeySigner>,
}

impl SignerStore {
    pub fn from_mnemonic(phrase: &str, indices: Range<u32>) -> Result<Self> {
        let signers = indices
            .map(|i| {
                MnemonicBuilder::<English>::default()
                    .phrase(phrase.trim())
                    .index(i)?
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { signers })
    }

    /// Account indices owned by process number `index` when each process
    /// drives `per_worker` accounts.
    pub fn worker_range(index: u32, per_worker: u32) -> Range<u32> {
        let start = index.saturating_mul(per_worker);
        start..start.saturating_add(per_worker)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.signers.iter().map(|s| s.address()).collect()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    #[test]
    fn derives_well_known_accounts() {
        let store = SignerStore::from_mnemonic(TEST_MNEMONIC, 0..2).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.addresses(),
            vec![
                address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
                address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"),
            ]
        );
    }

    #[test]
    fn worker_ranges_do_not_overlap() {
        assert_eq!(SignerStore::worker_range(0, 10), 0..10);
        assert_eq!(SignerStore::worker_range(3, 10), 30..40);
    }

    #[test]
    fn bad_mnemonic_is_an_error() {
        assert!(SignerStore::from_mnemonic("not a mnemonic", 0..1).is_err());
    }
}
