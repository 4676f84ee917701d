//! Token contract binding
//!
//! ABI encoding for the fungible token the demonstration deploys. Only the
//! calldata is produced here; balance and supply arithmetic belong to the
//! contract itself.

use crate::privacy::PrivacyGroup;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use web3::ethabi::{self, ParamType, Token};
use web3::types::{Address, U256};

pub mod signatures {
    pub const TRANSFER: &str = "transfer(address,uint256)";
    pub const MINT: &str = "mint(address,uint256)";
    pub const BURN: &str = "burn(uint256)";
    pub const BALANCE_OF: &str = "balanceOf(address)";
    pub const TOTAL_SUPPLY: &str = "totalSupply()";
}

/// First four bytes of keccak256 over the canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

fn with_selector(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&ethabi::encode(args));
    data
}

fn split_selector(data: &[u8]) -> Option<([u8; 4], &[u8])> {
    if data.len() < 4 {
        return None;
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&data[..4]);
    Some((sel, &data[4..]))
}

/// Constructor parameters of the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDefinition {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub initial_supply: U256,
}

impl TokenDefinition {
    /// `(uint256 initialSupply, string name, string symbol, uint8 decimals)`
    pub fn constructor_args(&self) -> Vec<u8> {
        ethabi::encode(&[
            Token::Uint(self.initial_supply),
            Token::String(self.name.clone()),
            Token::String(self.symbol.clone()),
            Token::Uint(U256::from(self.decimals)),
        ])
    }

    pub fn decode_constructor_args(data: &[u8]) -> Result<Self, ethabi::Error> {
        let tokens = ethabi::decode(
            &[ParamType::Uint(256), ParamType::String, ParamType::String, ParamType::Uint(8)],
            data,
        )?;
        let mut it = tokens.into_iter();
        match (it.next(), it.next(), it.next(), it.next()) {
            (
                Some(Token::Uint(initial_supply)),
                Some(Token::String(name)),
                Some(Token::String(symbol)),
                Some(Token::Uint(decimals)),
            ) => Ok(Self {
                name,
                symbol,
                decimals: u8::try_from(decimals).map_err(|_| ethabi::Error::InvalidData)?,
                initial_supply,
            }),
            _ => Err(ethabi::Error::InvalidData),
        }
    }
}

/// State-changing token operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    Deploy(TokenDefinition),
    Transfer { to: Address, amount: U256 },
    Mint { to: Address, amount: U256 },
    Burn { amount: U256 },
}

impl ContractCall {
    /// Calldata for a call against an existing contract, `None` for a deployment
    pub fn calldata(&self) -> Option<Vec<u8>> {
        match self {
            ContractCall::Deploy(_) => None,
            ContractCall::Transfer { to, amount } => Some(with_selector(
                signatures::TRANSFER,
                &[Token::Address(*to), Token::Uint(*amount)],
            )),
            ContractCall::Mint { to, amount } => Some(with_selector(
                signatures::MINT,
                &[Token::Address(*to), Token::Uint(*amount)],
            )),
            ContractCall::Burn { amount } => {
                Some(with_selector(signatures::BURN, &[Token::Uint(*amount)]))
            }
        }
    }

    /// Inverse of [`ContractCall::calldata`]
    pub fn decode(data: &[u8]) -> Option<Self> {
        let (sel, args) = split_selector(data)?;
        if sel == selector(signatures::TRANSFER) || sel == selector(signatures::MINT) {
            let tokens = ethabi::decode(&[ParamType::Address, ParamType::Uint(256)], args).ok()?;
            let to = tokens.first()?.clone().into_address()?;
            let amount = tokens.get(1)?.clone().into_uint()?;
            if sel == selector(signatures::TRANSFER) {
                Some(ContractCall::Transfer { to, amount })
            } else {
                Some(ContractCall::Mint { to, amount })
            }
        } else if sel == selector(signatures::BURN) {
            let tokens = ethabi::decode(&[ParamType::Uint(256)], args).ok()?;
            let amount = tokens.first()?.clone().into_uint()?;
            Some(ContractCall::Burn { amount })
        } else {
            None
        }
    }
}

impl fmt::Display for ContractCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractCall::Deploy(def) => write!(f, "deploy {} ({})", def.name, def.symbol),
            ContractCall::Transfer { to, amount } => write!(f, "transfer {} to {:?}", amount, to),
            ContractCall::Mint { to, amount } => write!(f, "mint {} to {:?}", amount, to),
            ContractCall::Burn { amount } => write!(f, "burn {}", amount),
        }
    }
}

/// Read-only token queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractQuery {
    BalanceOf(Address),
    TotalSupply,
}

impl ContractQuery {
    pub fn calldata(&self) -> Vec<u8> {
        match self {
            ContractQuery::BalanceOf(owner) => {
                with_selector(signatures::BALANCE_OF, &[Token::Address(*owner)])
            }
            ContractQuery::TotalSupply => with_selector(signatures::TOTAL_SUPPLY, &[]),
        }
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let (sel, args) = split_selector(data)?;
        if sel == selector(signatures::BALANCE_OF) {
            let tokens = ethabi::decode(&[ParamType::Address], args).ok()?;
            Some(ContractQuery::BalanceOf(tokens.first()?.clone().into_address()?))
        } else if sel == selector(signatures::TOTAL_SUPPLY) {
            Some(ContractQuery::TotalSupply)
        } else {
            None
        }
    }

    /// Both queries return a single `uint256`
    pub fn decode_output(output: &[u8]) -> Result<U256, ethabi::Error> {
        ethabi::decode(&[ParamType::Uint(256)], output)?
            .into_iter()
            .next()
            .and_then(Token::into_uint)
            .ok_or(ethabi::Error::InvalidData)
    }
}

impl fmt::Display for ContractQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractQuery::BalanceOf(owner) => write!(f, "balanceOf({:?})", owner),
            ContractQuery::TotalSupply => f.write_str("totalSupply()"),
        }
    }
}

/// A deployed token and the group it was created for.
///
/// The creation group is the contract's visibility boundary for its whole
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    pub address: Address,
    pub creation_group: PrivacyGroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector(signatures::TRANSFER)), "a9059cbb");
        assert_eq!(hex::encode(selector(signatures::BALANCE_OF)), "70a08231");
        assert_eq!(hex::encode(selector(signatures::TOTAL_SUPPLY)), "18160ddd");
        assert_eq!(hex::encode(selector(signatures::BURN)), "42966c68");
        assert_eq!(hex::encode(selector(signatures::MINT)), "40c10f19");
    }

    #[test]
    fn test_transfer_calldata_layout() {
        let to = Address::from_low_u64_be(0xbeef);
        let data = ContractCall::Transfer { to, amount: U256::from(100_000u64) }
            .calldata()
            .unwrap();

        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(&data[16..36], to.as_bytes());
        assert_eq!(U256::from_big_endian(&data[36..68]), U256::from(100_000u64));
    }

    #[test]
    fn test_deploy_has_no_calldata() {
        let def = TokenDefinition {
            name: "Quorum Token".into(),
            symbol: "QT".into(),
            decimals: 8,
            initial_supply: U256::from(1_000_000u64),
        };
        assert!(ContractCall::Deploy(def).calldata().is_none());
    }

    #[test]
    fn test_constructor_args_decode() {
        let def = TokenDefinition {
            name: "Quorum Token".into(),
            symbol: "QT".into(),
            decimals: 8,
            initial_supply: U256::from(1_000_000u64),
        };
        let decoded = TokenDefinition::decode_constructor_args(&def.constructor_args()).unwrap();
        assert_eq!(decoded, def);
    }

    #[test]
    fn test_out_of_range_decimals_are_refused() {
        let data = ethabi::encode(&[
            Token::Uint(U256::from(1_000u64)),
            Token::String("Quorum Token".into()),
            Token::String("QT".into()),
            Token::Uint(U256::from(300u64)),
        ]);
        assert!(TokenDefinition::decode_constructor_args(&data).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_selector() {
        assert!(ContractCall::decode(&[0xde, 0xad, 0xbe, 0xef]).is_none());
        assert!(ContractQuery::decode(&[0x01]).is_none());
        assert_eq!(
            ContractQuery::decode(&ContractQuery::TotalSupply.calldata()),
            Some(ContractQuery::TotalSupply)
        );
    }

    #[test]
    fn test_empty_output_does_not_decode_to_zero() {
        assert!(ContractQuery::decode_output(&[]).is_err());

        let encoded = ethabi::encode(&[Token::Uint(U256::from(42u64))]);
        assert_eq!(ContractQuery::decode_output(&encoded).unwrap(), U256::from(42u64));
    }
}
