//! HD key derivation for the signer pool.

use alloy::network::EthereumWallet;
use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};

use crate::error::{SignerError, SignerResult};

/// Derive `pool_size` signers from a BIP-39 mnemonic at the standard
/// Ethereum derivation path, indices `0..pool_size`.
pub fn derive_signers(mnemonic: &str, pool_size: usize) -> SignerResult<Vec<PrivateKeySigner>> {
    if pool_size == 0 {
        return Err(SignerError::Derivation("pool size must be >= 1".into()));
    }
    (0..pool_size as u32)
        .map(|index| {
            MnemonicBuilder::<English>::default()
                .phrase(mnemonic)
                .index(index)
                .map_err(|e| SignerError::Derivation(e.to_string()))?
                .build()
                .map_err(|e| SignerError::Derivation(e.to_string()))
        })
        .collect()
}

/// Assemble the provider wallet carrying every pool signer, so that
/// `TxOptions::from` selects the key per submission.
pub fn build_wallet(signers: &[PrivateKeySigner]) -> SignerResult<EthereumWallet> {
    let mut iter = signers.iter();
    let first = iter
        .next()
        .ok_or_else(|| SignerError::Derivation("empty signer set".into()))?;
    let mut wallet = EthereumWallet::new(first.clone());
    for signer in iter {
        wallet.register_signer(signer.clone());
    }
    Ok(wallet)
}
