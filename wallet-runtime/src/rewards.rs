//! GreenPoints rewards and token authorization messages.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, Signature, U256};
use serde::{Deserialize, Serialize};

use crate::contracts::IGreenPoints;
use crate::error::WalletError;
use crate::factory::ContractHandle;

/// Why points were awarded. Discriminants are the on-chain `uint8` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointsReason {
    Recycling = 0,
    VerifiedResale = 1,
    Repair = 2,
    Refurbishment = 3,
    SustainabilityBadge = 4,
    EcoAudit = 5,
    CarbonOffset = 6,
    CircularEarning = 7,
}

impl PointsReason {
    pub const ALL: [PointsReason; 8] = [
        PointsReason::Recycling,
        PointsReason::VerifiedResale,
        PointsReason::Repair,
        PointsReason::Refurbishment,
        PointsReason::SustainabilityBadge,
        PointsReason::EcoAudit,
        PointsReason::CarbonOffset,
        PointsReason::CircularEarning,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PointsReason::Recycling => "RECYCLING",
            PointsReason::VerifiedResale => "VERIFIED_RESALE",
            PointsReason::Repair => "REPAIR",
            PointsReason::Refurbishment => "REFURBISHMENT",
            PointsReason::SustainabilityBadge => "SUSTAINABILITY_BADGE",
            PointsReason::EcoAudit => "ECO_AUDIT",
            PointsReason::CarbonOffset => "CARBON_OFFSET",
            PointsReason::CircularEarning => "CIRCULAR_EARNING",
        }
    }
}

impl fmt::Display for PointsReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointsReason {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| WalletError::InvalidInput(format!("Unknown points reason: {s}")))
    }
}

impl TryFrom<u8> for PointsReason {
    type Error = WalletError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| WalletError::InvalidInput(format!("Unknown points reason code: {code}")))
    }
}

/// Submit `issuePoints` through the handle's signer. Returns the tx hash.
pub async fn issue_points(
    green_points: &ContractHandle,
    user: Address,
    amount: U256,
    reason: PointsReason,
    description: &str,
) -> Result<B256, WalletError> {
    if amount.is_zero() {
        return Err(WalletError::InvalidInput(
            "Points amount must be greater than zero".into(),
        ));
    }
    tracing::info!(%user, %amount, %reason, "Issuing green points");
    green_points
        .send(&IGreenPoints::issuePointsCall {
            user,
            amount,
            reason: reason.code(),
            description: description.to_string(),
        })
        .await
}

pub async fn points_balance(green_points: &ContractHandle, user: Address) -> Result<U256, WalletError> {
    green_points
        .call(&IGreenPoints::getBalanceCall { user })
        .await
}

// ── Authorization messages ───────────────────────────────────────────────────

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn mint_authorization_message(
    token_id: &str,
    amount: u64,
    recipient: Address,
    timestamp_ms: i64,
) -> String {
    format!("Mint Token: {token_id} | Amount: {amount} | Recipient: {recipient} | Timestamp: {timestamp_ms}")
}

pub fn transfer_authorization_message(
    token_id: &str,
    from: Address,
    to: Address,
    amount: u64,
    timestamp_ms: i64,
) -> String {
    format!(
        "Transfer Token: {token_id} | From: {from} | To: {to} | Amount: {amount} | Timestamp: {timestamp_ms}"
    )
}

/// Check that `signature` is an EIP-191 signature of `message` by `expected`.
///
/// A well-formed signature from another account yields `Ok(false)`; a
/// malformed one is an error.
pub fn verify_signature(message: &str, signature: &str, expected: Address) -> Result<bool, WalletError> {
    let raw = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|e| WalletError::InvalidInput(format!("Signature is not hex: {e}")))?;
    let signature = Signature::try_from(raw.as_slice())
        .map_err(|e| WalletError::InvalidInput(format!("Invalid signature: {e}")))?;
    let recovered = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| WalletError::InvalidInput(format!("Signature recovery failed: {e}")))?;
    Ok(recovered == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::GREEN_POINTS;
    use crate::factory::{ContractFactory, ContractRegistry, WalletSigner};
    use crate::provider::ProviderAdapter;
    use crate::simulated::{DEV_PRIVATE_KEY, SimulatedWallet};
    use crate::types::ContractDescriptor;
    use alloy::json_abi::JsonAbi;
    use alloy::primitives::Bytes;
    use alloy::sol_types::{SolCall, SolValue};
    use std::sync::Arc;

    fn green_points_handle(wallet: &Arc<SimulatedWallet>) -> ContractHandle {
        let descriptor = ContractDescriptor {
            logical_name: GREEN_POINTS.into(),
            address: Address::repeat_byte(0x2e),
            interface: JsonAbi::parse(crate::contracts::builtin_abi(GREEN_POINTS).unwrap().iter().copied())
                .unwrap(),
        };
        let signer = WalletSigner::new(
            wallet.accounts()[0],
            296,
            ProviderAdapter::new(Some(wallet.clone())),
        );
        ContractFactory::new(ContractRegistry::new([descriptor]))
            .try_get_contract(GREEN_POINTS, Some(&signer))
            .unwrap()
    }

    fn authorized_wallet() -> Arc<SimulatedWallet> {
        let wallet = SimulatedWallet::new(&[DEV_PRIVATE_KEY.to_string()], 296).unwrap();
        wallet.authorize();
        Arc::new(wallet)
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(PointsReason::Recycling.code(), 0);
        assert_eq!(PointsReason::CircularEarning.code(), 7);
        for reason in PointsReason::ALL {
            assert_eq!(PointsReason::try_from(reason.code()).unwrap(), reason);
        }
        assert!(PointsReason::try_from(8).is_err());
    }

    #[test]
    fn test_reason_names() {
        assert_eq!("ECO_AUDIT".parse::<PointsReason>().unwrap(), PointsReason::EcoAudit);
        assert_eq!("repair".parse::<PointsReason>().unwrap(), PointsReason::Repair);
        assert!("COMPOSTING".parse::<PointsReason>().is_err());
        assert_eq!(
            serde_json::to_string(&PointsReason::VerifiedResale).unwrap(),
            "\"VERIFIED_RESALE\""
        );
    }

    #[test]
    fn test_message_formats() {
        let recipient = Address::repeat_byte(0x11);
        assert_eq!(
            mint_authorization_message("0.0.1234", 5, recipient, 1_700_000_000_000),
            format!("Mint Token: 0.0.1234 | Amount: 5 | Recipient: {recipient} | Timestamp: 1700000000000")
        );
        let to = Address::repeat_byte(0x22);
        assert_eq!(
            transfer_authorization_message("0.0.1234", recipient, to, 1, 42),
            format!("Transfer Token: 0.0.1234 | From: {recipient} | To: {to} | Amount: 1 | Timestamp: 42")
        );
    }

    #[tokio::test]
    async fn test_verify_wallet_signature() {
        let wallet = authorized_wallet();
        let signer = WalletSigner::new(
            wallet.accounts()[0],
            296,
            ProviderAdapter::new(Some(wallet.clone())),
        );
        let message = mint_authorization_message("0.0.1", 1, signer.address(), now_millis());
        let signature = signer.sign_message(&message).await.unwrap();

        assert!(verify_signature(&message, &signature, signer.address()).unwrap());
        assert!(!verify_signature(&message, &signature, Address::repeat_byte(9)).unwrap());
        assert!(!verify_signature("tampered", &signature, signer.address()).unwrap());
        assert!(verify_signature(&message, "0x1234", signer.address()).is_err());
    }

    #[tokio::test]
    async fn test_issue_points_encodes_reason() {
        let wallet = authorized_wallet();
        let handle = green_points_handle(&wallet);
        let user = Address::repeat_byte(0x44);

        issue_points(&handle, user, U256::from(25u64), PointsReason::Repair, "fixed a laptop")
            .await
            .unwrap();

        let requests = wallet.requests();
        let (_, params) = requests.last().unwrap();
        let data: Bytes = params[0]["data"].as_str().unwrap().parse().unwrap();
        let decoded = IGreenPoints::issuePointsCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.user, user);
        assert_eq!(decoded.reason, 2);
        assert_eq!(decoded.description, "fixed a laptop");
    }

    #[tokio::test]
    async fn test_zero_points_rejected() {
        let wallet = authorized_wallet();
        let handle = green_points_handle(&wallet);
        assert!(
            issue_points(&handle, Address::ZERO, U256::ZERO, PointsReason::Recycling, "")
                .await
                .is_err()
        );
        assert!(wallet.requests().is_empty());
    }

    #[tokio::test]
    async fn test_points_balance() {
        let wallet = authorized_wallet();
        wallet.set_call_result(
            IGreenPoints::getBalanceCall::SELECTOR,
            Bytes::from(U256::from(480u64).abi_encode()),
        );
        let handle = green_points_handle(&wallet);
        assert_eq!(
            points_balance(&handle, Address::repeat_byte(1)).await.unwrap(),
            U256::from(480u64)
        );
    }
}
