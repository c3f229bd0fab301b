//! Contract ABI encoding
//!
//! Only the handful of static-argument functions the game uses are needed,
//! so calls are encoded directly: a 4-byte selector followed by one 32-byte
//! big-endian word per argument.

use super::{GameCall, ReadQuery};
use crate::{ClientError, ClientResult};
use shared::models::{Address, Amount};

pub type Selector = [u8; 4];
pub type Word = [u8; 32];

// keccak256 of the canonical signature, first 4 bytes
pub const GET_PLAYER_LOCATION: Selector = [0xcb, 0x78, 0x69, 0xfd]; // getPlayerLocation(address)
pub const MOVE: Selector = [0x08, 0x67, 0x40, 0x8f]; // move(uint256,uint256)
pub const GET_LOCATION_BASE_POWER: Selector = [0x9e, 0x4e, 0x0c, 0x97]; // getLocationBasePower(uint256)
pub const GET_LOCATION_OWNER: Selector = [0x08, 0xf7, 0xdd, 0xec]; // getLocationOwner(uint256)
pub const GET_BALANCE: Selector = [0xd4, 0xfa, 0xc4, 0x5d]; // getBalance(address,address)
pub const DEPOSIT: Selector = [0x47, 0xe7, 0xef, 0x24]; // deposit(address,uint256)
pub const APPROVE: Selector = [0x09, 0x5e, 0xa7, 0xb3]; // approve(address,uint256)
pub const BALANCE_OF: Selector = [0x70, 0xa0, 0x82, 0x31]; // balanceOf(address)
pub const ALLOWANCE: Selector = [0xdd, 0x62, 0xed, 0x3e]; // allowance(address,address)
pub const GARRISON: Selector = [0x94, 0x62, 0xfa, 0x19]; // garrison()
pub const ATTACK: Selector = [0x46, 0x87, 0x7f, 0x38]; // attack(uint256,address,uint256)
pub const SPAWN: Selector = [0x2a, 0x7c, 0x3e, 0x8e]; // spawn(uint256,uint256,uint256)
pub const FORTIFY: Selector = [0x5b, 0x9a, 0x04, 0x49]; // fortify(uint256,address,uint256)
pub const GET_UNITS: Selector = [0x64, 0x5e, 0x2b, 0x04]; // getUnits(uint256,address)
pub const GET_TOKEN: Selector = [0xe4, 0xb5, 0x0c, 0xb8]; // getToken(uint256)

/// `Error(string)`, the payload of a `require(cond, "reason")` revert
pub const ERROR_STRING: Selector = [0x08, 0xc3, 0x79, 0xa0];

/// Call data builder
#[derive(Debug, Clone)]
pub struct CallData {
    bytes: Vec<u8>,
}

impl CallData {
    pub fn new(selector: Selector) -> Self {
        let mut bytes = Vec::with_capacity(4 + 3 * 32);
        bytes.extend_from_slice(&selector);
        Self { bytes }
    }

    pub fn uint(mut self, value: u128) -> Self {
        self.bytes.extend_from_slice(&uint_word(value));
        self
    }

    pub fn amount(mut self, value: Amount) -> Self {
        self.bytes.extend_from_slice(&amount_word(value));
        self
    }

    pub fn address(mut self, value: Address) -> Self {
        self.bytes.extend_from_slice(&address_word(value));
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.bytes))
    }
}

pub fn uint_word(value: u128) -> Word {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// [`Amount::MAX`] is the unlimited approval, `2^256 - 1` on the wire
pub fn amount_word(value: Amount) -> Word {
    if value.is_unlimited() {
        [0xff; 32]
    } else {
        uint_word(value.wei())
    }
}

pub fn address_word(value: Address) -> Word {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(value.as_bytes());
    word
}

/// Unit counts travel as 18-decimal token amounts
fn units(units: u64) -> Amount {
    Amount::from_units(units)
}

/// Call data of a read query
pub fn encode_read(query: &ReadQuery) -> Vec<u8> {
    let data = match *query {
        ReadQuery::PlayerLocation { player } => CallData::new(GET_PLAYER_LOCATION).address(player),
        ReadQuery::LocationOwner { location } => {
            CallData::new(GET_LOCATION_OWNER).uint(location.get().into())
        }
        ReadQuery::LocationBasePower { location } => {
            CallData::new(GET_LOCATION_BASE_POWER).uint(location.get().into())
        }
        ReadQuery::GarrisonUnits { location, token, .. } => CallData::new(GET_UNITS)
            .uint(location.get().into())
            .address(token),
        ReadQuery::TokenBalance { owner, .. } => CallData::new(BALANCE_OF).address(owner),
        ReadQuery::EscrowBalance { owner, token } => {
            CallData::new(GET_BALANCE).address(owner).address(token)
        }
        ReadQuery::Allowance { owner, spender, .. } => {
            CallData::new(ALLOWANCE).address(owner).address(spender)
        }
        ReadQuery::GarrisonContract => CallData::new(GARRISON),
        ReadQuery::UnitToken { level } => CallData::new(GET_TOKEN).uint(level.into()),
    };
    data.into_bytes()
}

/// Call data of a game write
pub fn encode_call(call: &GameCall) -> Vec<u8> {
    let data = match *call {
        GameCall::Approve {
            spender, amount, ..
        } => CallData::new(APPROVE).address(spender).amount(amount),
        GameCall::Deposit { token, amount } => CallData::new(DEPOSIT).address(token).amount(amount),
        GameCall::Spawn {
            location,
            level,
            units: count,
        } => CallData::new(SPAWN)
            .uint(location.get().into())
            .uint(level.into())
            .amount(units(count)),
        GameCall::Move { from, to } => CallData::new(MOVE)
            .uint(from.get().into())
            .uint(to.get().into()),
        GameCall::Fortify {
            location,
            token,
            units: count,
            ..
        } => CallData::new(FORTIFY)
            .uint(location.get().into())
            .address(token)
            .amount(units(count)),
        GameCall::Attack {
            location,
            token,
            units: count,
        } => CallData::new(ATTACK)
            .uint(location.get().into())
            .address(token)
            .amount(units(count)),
    };
    data.into_bytes()
}

fn first_word(data: &[u8]) -> ClientResult<&[u8]> {
    data.get(..32).ok_or_else(|| {
        ClientError::invalid_response(format!("expected a 32-byte word, got {} bytes", data.len()))
    })
}

/// Decode a `uint256` return value, saturating to [`Amount::MAX`]
pub fn decode_uint(data: &[u8]) -> ClientResult<Amount> {
    let word = first_word(data)?;
    if word[..16].iter().any(|b| *b != 0) {
        return Ok(Amount::MAX);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(Amount::from_wei(u128::from_be_bytes(low)))
}

/// Decode an `address` return value
pub fn decode_address(data: &[u8]) -> ClientResult<Address> {
    let word = first_word(data)?;
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(Address::from_bytes(bytes))
}

/// Extract the reason string from an `Error(string)` revert payload
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_STRING[..])?;
    let offset = word_to_usize(body.get(..32)?)?;
    let len_at = offset.checked_add(32)?;
    let len = word_to_usize(body.get(offset..len_at)?)?;
    let raw = body.get(len_at..len_at.checked_add(len)?)?;
    String::from_utf8(raw.to_vec()).ok()
}

fn word_to_usize(word: &[u8]) -> Option<usize> {
    if word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..32]);
    usize::try_from(u64::from_be_bytes(low)).ok()
}

/// Decode `0x`-prefixed hex bytes
pub fn parse_hex(value: &str) -> ClientResult<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| ClientError::invalid_response(format!("bad hex data: {}", e)))
}

/// JSON-RPC quantity: `0x`-prefixed hex without leading zeros
pub fn encode_quantity(value: u128) -> String {
    format!("{:#x}", value)
}

pub fn decode_quantity(value: &str) -> ClientResult<u64> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ClientError::invalid_response(format!("bad quantity {}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::LocationId;

    fn word_hex(word: &[u8]) -> String {
        hex::encode(word)
    }

    #[test]
    fn test_balance_of_call() {
        let owner = Address::from_bytes([0xab; 20]);
        let data = encode_read(&ReadQuery::TokenBalance {
            token: Address::ZERO,
            owner,
        });
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(word_hex(&data[4..]), format!("{}{}", "00".repeat(12), "ab".repeat(20)));
    }

    #[test]
    fn test_move_call() {
        let data = encode_call(&GameCall::Move {
            from: LocationId::new(1),
            to: LocationId::new(3),
        });
        assert_eq!(&data[..4], &MOVE);
        assert_eq!(data[35], 1);
        assert_eq!(data[67], 3);
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn test_unit_amounts_are_scaled() {
        let data = encode_call(&GameCall::Attack {
            location: LocationId::new(2),
            token: Address::from_bytes([1; 20]),
            units: 25,
        });
        let amount = decode_uint(&data[4 + 64..]).unwrap();
        assert_eq!(amount, Amount::from_units(25));
    }

    #[test]
    fn test_unlimited_approval_is_all_ones() {
        let data = encode_call(&GameCall::Approve {
            token: Address::ZERO,
            spender: Address::from_bytes([2; 20]),
            amount: Amount::MAX,
        });
        assert!(data[4 + 32..].iter().all(|b| *b == 0xff));
    }

    #[test]
    fn test_decode_uint_saturates() {
        assert_eq!(decode_uint(&[0xff; 32]).unwrap(), Amount::MAX);
        assert_eq!(decode_uint(&uint_word(42)).unwrap(), Amount::from_wei(42));
        assert!(decode_uint(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_decode_address() {
        let a = Address::from_bytes([7; 20]);
        assert_eq!(decode_address(&address_word(a)).unwrap(), a);
    }

    #[test]
    fn test_decode_revert_reason() {
        let reason = b"not adjacent";
        let mut data = ERROR_STRING.to_vec();
        data.extend_from_slice(&uint_word(32));
        data.extend_from_slice(&uint_word(reason.len() as u128));
        let mut padded = [0u8; 32];
        padded[..reason.len()].copy_from_slice(reason);
        data.extend_from_slice(&padded);

        assert_eq!(decode_revert_reason(&data).as_deref(), Some("not adjacent"));
        assert_eq!(decode_revert_reason(&data[..40]), None);
        assert_eq!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef]), None);
    }

    #[test]
    fn test_quantities() {
        assert_eq!(encode_quantity(0), "0x0");
        assert_eq!(encode_quantity(10_000_000_000_000_000), "0x2386f26fc10000");
        assert_eq!(decode_quantity("0x15eb").unwrap(), 5611);
        assert!(decode_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(parse_hex("0x").unwrap(), Vec::<u8>::new());
        assert!(parse_hex("0x1").is_err());
    }
}
