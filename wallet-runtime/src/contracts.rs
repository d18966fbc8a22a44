//! Solidity bindings for the ReGen Marketplace contracts.
//!
//! Uses alloy's `sol!` macro to generate type-safe ABI encoders/decoders.
//! The human-readable interfaces below are the default interface specs the
//! contract registry falls back to when the configuration carries none.

use alloy::sol;

pub const ACCESS_CONTROL: &str = "AccessControl";
pub const PRODUCT_PASSPORT: &str = "ProductPassport";
pub const LIFECYCLE_EVENT: &str = "LifecycleEvent";
pub const GREEN_POINTS: &str = "GreenPoints";

sol! {
    interface IAccessControl {
        function MANUFACTURER_ROLE() external view returns (bytes32);
        function grantRole(bytes32 role, address account) external;
        function revokeRole(bytes32 role, address account) external;
        function hasRole(bytes32 role, address account) external view returns (bool);
    }

    interface IProductPassport {
        function mintProductNFT(string calldata metadataURI, address manufacturer, string calldata serialNumber) external returns (uint256 tokenId);
        function transferOwnership(uint256 tokenId, address newOwner, string calldata reason) external;
        function ownerOf(uint256 tokenId) external view returns (address);
        function tokenURI(uint256 tokenId) external view returns (string memory);
    }

    interface ILifecycleEvent {
        function setProductPassportAddress(address productPassport) external;
        function productPassportAddress() external view returns (address);
    }

    interface IGreenPoints {
        function issuePoints(address user, uint256 amount, uint8 reason, string calldata description) external;
        function getBalance(address user) external view returns (uint256);
    }
}

const ACCESS_CONTROL_ABI: &[&str] = &[
    "function MANUFACTURER_ROLE() view returns (bytes32)",
    "function grantRole(bytes32 role, address account)",
    "function revokeRole(bytes32 role, address account)",
    "function hasRole(bytes32 role, address account) view returns (bool)",
];

const PRODUCT_PASSPORT_ABI: &[&str] = &[
    "function mintProductNFT(string metadataURI, address manufacturer, string serialNumber) returns (uint256 tokenId)",
    "function transferOwnership(uint256 tokenId, address newOwner, string reason)",
    "function ownerOf(uint256 tokenId) view returns (address)",
    "function tokenURI(uint256 tokenId) view returns (string)",
];

const LIFECYCLE_EVENT_ABI: &[&str] = &[
    "function setProductPassportAddress(address productPassport)",
    "function productPassportAddress() view returns (address)",
];

const GREEN_POINTS_ABI: &[&str] = &[
    "function issuePoints(address user, uint256 amount, uint8 reason, string description)",
    "function getBalance(address user) view returns (uint256)",
];

/// Built-in human-readable interface for a known logical contract name.
pub fn builtin_abi(logical_name: &str) -> Option<&'static [&'static str]> {
    match logical_name {
        ACCESS_CONTROL => Some(ACCESS_CONTROL_ABI),
        PRODUCT_PASSPORT => Some(PRODUCT_PASSPORT_ABI),
        LIFECYCLE_EVENT => Some(LIFECYCLE_EVENT_ABI),
        GREEN_POINTS => Some(GREEN_POINTS_ABI),
        _ => None,
    }
}
