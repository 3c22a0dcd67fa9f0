//! EIP-712 domains, struct hashes and signing digests.
//!
//! Two schemas exist, one per settlement path:
//!
//! - `TransferWithAuthorization`: native-gasless tokens (EIP-3009), signed
//!   under the token's own domain with a random 32-byte nonce.
//! - `ERC20Payment`: proxy-settled tokens, signed under the settlement
//!   contract's `{"Primer", "1"}` domain with its sequential nonce.
//!
//! Each schema gets its own constructor with the type hash baked in, so there
//! is no runtime "primary type" selection and nothing order-dependent.

use crate::errors::Result;
use ethers::abi::Token;
use ethers::core::utils::keccak256;
use ethers::types::{Address, Signature, H256, U256};

/// EIP-712 domain name of the settlement (proxy) contract.
pub const PROXY_DOMAIN_NAME: &str = "Primer";

/// EIP-712 domain version of the settlement (proxy) contract.
pub const PROXY_DOMAIN_VERSION: &str = "1";

const TRANSFER_WITH_AUTHORIZATION_TYPE: &[u8] =
    b"TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)";

const ERC20_PAYMENT_TYPE: &[u8] =
    b"ERC20Payment(address token,address from,address to,uint256 value,uint256 nonce,uint256 validAfter,uint256 validBefore)";

/// Computes the EIP-712 domain separator.
pub fn domain_separator(
    name: &str,
    version: &str,
    chain_id: U256,
    verifying_contract: Address,
) -> H256 {
    let type_hash = keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );

    H256::from(keccak256(ethers::abi::encode(&[
        Token::FixedBytes(type_hash.to_vec()),
        Token::FixedBytes(keccak256(name.as_bytes()).to_vec()),
        Token::FixedBytes(keccak256(version.as_bytes()).to_vec()),
        Token::Uint(chain_id),
        Token::Address(verifying_contract),
    ])))
}

// "\x19\x01" ‖ domainSeparator ‖ hashStruct(message)
fn eip712_digest(domain_separator: H256, struct_hash: [u8; 32]) -> H256 {
    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(b"\x19\x01");
    message.extend_from_slice(domain_separator.as_bytes());
    message.extend_from_slice(&struct_hash);
    H256::from(keccak256(&message))
}

/// Signing digest for a native-gasless (EIP-3009) transfer authorization.
///
/// The domain belongs to the token itself: `{token name, token version,
/// chain id, token address}`.
#[allow(clippy::too_many_arguments)]
pub fn transfer_authorization_digest(
    token_name: &str,
    token_version: &str,
    chain_id: U256,
    token: Address,
    from: Address,
    to: Address,
    value: U256,
    valid_after: U256,
    valid_before: U256,
    nonce: H256,
) -> H256 {
    let domain = domain_separator(token_name, token_version, chain_id, token);

    let struct_hash = keccak256(ethers::abi::encode(&[
        Token::FixedBytes(keccak256(TRANSFER_WITH_AUTHORIZATION_TYPE).to_vec()),
        Token::Address(from),
        Token::Address(to),
        Token::Uint(value),
        Token::Uint(valid_after),
        Token::Uint(valid_before),
        Token::FixedBytes(nonce.as_bytes().to_vec()),
    ]));

    eip712_digest(domain, struct_hash)
}

/// Signing digest for a proxy-settled payment.
///
/// The domain belongs to the settlement contract: `{"Primer", "1", chain id,
/// proxy address}`. The settlement contract recomputes this exact digest when
/// it recovers the signer.
#[allow(clippy::too_many_arguments)]
pub fn erc20_payment_digest(
    chain_id: U256,
    proxy: Address,
    token: Address,
    from: Address,
    to: Address,
    value: U256,
    nonce: U256,
    valid_after: U256,
    valid_before: U256,
) -> H256 {
    let domain = domain_separator(PROXY_DOMAIN_NAME, PROXY_DOMAIN_VERSION, chain_id, proxy);

    let struct_hash = keccak256(ethers::abi::encode(&[
        Token::FixedBytes(keccak256(ERC20_PAYMENT_TYPE).to_vec()),
        Token::Address(token),
        Token::Address(from),
        Token::Address(to),
        Token::Uint(value),
        Token::Uint(nonce),
        Token::Uint(valid_after),
        Token::Uint(valid_before),
    ]));

    eip712_digest(domain, struct_hash)
}

/// Generates a random 32-byte nonce for the native-gasless path.
pub fn random_nonce() -> H256 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    H256::from(bytes)
}

/// Renders a 65-byte signature as `0x`-prefixed hex (r ‖ s ‖ v).
///
/// `v` is normalized to 27/28: external signing backends may hand back a raw
/// recovery id (0/1) or an EIP-155 value (`35 + 2 * chainId + parity`).
pub fn signature_to_hex(signature: &Signature) -> String {
    let mut r_bytes = [0u8; 32];
    signature.r.to_big_endian(&mut r_bytes);
    let mut s_bytes = [0u8; 32];
    signature.s.to_big_endian(&mut s_bytes);

    let mut sig_bytes = Vec::with_capacity(65);
    sig_bytes.extend_from_slice(&r_bytes);
    sig_bytes.extend_from_slice(&s_bytes);
    sig_bytes.push(normalize_v(signature.v));

    format!("0x{}", hex::encode(sig_bytes))
}

fn normalize_v(v: u64) -> u8 {
    match v {
        0 | 27 => 27,
        1 | 28 => 28,
        v if v >= 35 => 27 + ((v - 1) % 2) as u8,
        _ => 27,
    }
}

/// Recovers the signer of `digest` from a 65-byte hex signature.
pub fn recover_signer(digest: H256, signature_hex: &str) -> Result<Address> {
    let sig_hex = signature_hex.trim_start_matches("0x");
    let sig_bytes = hex::decode(sig_hex).map_err(|e| crate::errors::X402Error::Signature {
        reason: format!("invalid signature hex: {}", e),
    })?;

    let signature =
        Signature::try_from(sig_bytes.as_slice()).map_err(|e| crate::errors::X402Error::Signature {
            reason: e.to_string(),
        })?;

    Ok(signature.recover(digest)?)
}
