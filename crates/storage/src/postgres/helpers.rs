//! Shared helper functions for PostgreSQL row conversion and cursor
//! token encoding.

use alloy_primitives::{Address, B256, U256};
use hex::FromHex;

use ensrent_core::error::{StorageError, StorageResult};
use ensrent_core::ports::OrderDirection;

// =============================================================================
// Row Conversion
// =============================================================================

/// Convert a `Vec<u8>` to a 32-byte hash.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_b256(bytes: Vec<u8>, field_name: &str) -> StorageResult<B256> {
    let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })?;
    Ok(B256::from(arr))
}

/// Convert a `Vec<u8>` to a 20-byte Ethereum address.
pub fn bytes_to_address(bytes: Vec<u8>, field_name: &str) -> StorageResult<Address> {
    let arr: [u8; 20] = bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 20, got {}",
            field_name,
            v.len()
        ))
    })?;
    Ok(Address::from(arr))
}

/// Parse a NUMERIC column read back as decimal text into a `U256`.
pub fn u256_from_text(text: &str, field_name: &str) -> StorageResult<U256> {
    text.parse::<U256>().map_err(|e| {
        StorageError::SerializationError(format!("{} is not a valid uint256: {}", field_name, e))
    })
}

/// Convert a BIGINT column to a unix timestamp, rejecting negatives.
pub fn i64_to_u64(value: i64, field_name: &str) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| {
        StorageError::SerializationError(format!("{} is negative: {}", field_name, value))
    })
}

// =============================================================================
// Cursor Tokens
// =============================================================================

/// Version prefix of cursor tokens. Bump when the layout changes so stale
/// client cursors fail loudly instead of decoding garbage.
const CURSOR_VERSION: &str = "v1";

/// Decoded position from a cursor token.
///
/// Values are kept in their text form; the repositories bind them with
/// the casts appropriate to the sorted column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPosition {
    /// Sort column value of the row the cursor points at (decimal text).
    pub sort_value: String,
    /// Row id (transaction hash).
    pub id: B256,
    /// Row token id (decimal text).
    pub token_id: String,
}

/// Encode a keyset cursor token for a row.
///
/// The token binds the sort order it was minted under; `decode_cursor`
/// rejects tokens replayed against a different order. Layout (before hex
/// encoding): `v1|{order}|{dir}|{sort_value}|{id_hex}|{token_id}`.
pub fn encode_cursor(
    order_by: &str,
    direction: OrderDirection,
    sort_value: &str,
    id: &B256,
    token_id: &U256,
) -> String {
    let dir = match direction {
        OrderDirection::Asc => "asc",
        OrderDirection::Desc => "desc",
    };
    let raw = format!(
        "{}|{}|{}|{}|{}|{}",
        CURSOR_VERSION,
        order_by,
        dir,
        sort_value,
        hex::encode(id.as_slice()),
        token_id
    );
    hex::encode(raw.as_bytes())
}

/// Decode and validate a cursor token.
///
/// Fails with [`StorageError::InvalidCursor`] when the token is malformed
/// or was minted under a different sort order or direction.
pub fn decode_cursor(
    token: &str,
    expected_order_by: &str,
    expected_direction: OrderDirection,
) -> StorageResult<CursorPosition> {
    let bytes = Vec::from_hex(token)
        .map_err(|_| StorageError::InvalidCursor("not a hex token".into()))?;
    let raw = String::from_utf8(bytes)
        .map_err(|_| StorageError::InvalidCursor("not a utf-8 token".into()))?;

    let parts: Vec<&str> = raw.split('|').collect();
    if parts.len() != 6 {
        return Err(StorageError::InvalidCursor(format!(
            "expected 6 segments, got {}",
            parts.len()
        )));
    }

    if parts[0] != CURSOR_VERSION {
        return Err(StorageError::InvalidCursor(format!(
            "unsupported cursor version '{}'",
            parts[0]
        )));
    }

    if parts[1] != expected_order_by {
        return Err(StorageError::InvalidCursor(format!(
            "cursor was created under orderBy '{}' but the query orders by '{}'",
            parts[1], expected_order_by
        )));
    }

    let expected_dir = match expected_direction {
        OrderDirection::Asc => "asc",
        OrderDirection::Desc => "desc",
    };
    if parts[2] != expected_dir {
        return Err(StorageError::InvalidCursor(format!(
            "cursor was created under direction '{}' but the query uses '{}'",
            parts[2], expected_dir
        )));
    }

    let id_bytes = Vec::from_hex(parts[4])
        .map_err(|_| StorageError::InvalidCursor("invalid id segment".into()))?;
    let id = bytes_to_b256(id_bytes, "cursor.id")
        .map_err(|_| StorageError::InvalidCursor("invalid id length".into()))?;

    // Token id must at least look like a decimal number
    if parts[5].is_empty() || !parts[5].bytes().all(|b| b.is_ascii_digit()) {
        return Err(StorageError::InvalidCursor("invalid token id segment".into()));
    }

    Ok(CursorPosition {
        sort_value: parts[3].to_string(),
        id,
        token_id: parts[5].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id() -> B256 {
        B256::repeat_byte(0x5a)
    }

    #[test]
    fn cursor_roundtrip_preserves_position() {
        let token = encode_cursor(
            "price",
            OrderDirection::Asc,
            "123456789",
            &sample_id(),
            &U256::from(42u64),
        );
        let pos = decode_cursor(&token, "price", OrderDirection::Asc).unwrap();
        assert_eq!(pos.sort_value, "123456789");
        assert_eq!(pos.id, sample_id());
        assert_eq!(pos.token_id, "42");
    }

    // Test critique: un curseur rejoué sous un autre tri est rejeté,
    // jamais appliqué partiellement
    #[test]
    fn cursor_bound_to_sort_order() {
        let token = encode_cursor(
            "price",
            OrderDirection::Asc,
            "100",
            &sample_id(),
            &U256::from(1u64),
        );
        let err = decode_cursor(&token, "created_at", OrderDirection::Asc).unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursor(_)));

        let err = decode_cursor(&token, "price", OrderDirection::Desc).unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursor(_)));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for bad in ["", "zzzz", &hex::encode("v1|price|asc|1|deadbeef")] {
            assert!(matches!(
                decode_cursor(bad, "price", OrderDirection::Asc),
                Err(StorageError::InvalidCursor(_))
            ));
        }
    }

    // Test critique: erreurs incluent le nom du champ pour debug
    #[test]
    fn test_error_includes_field_name() {
        let bad_bytes = vec![1u8; 16]; // mauvaise longueur
        let result = bytes_to_b256(bad_bytes, "listing.node");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("listing.node"));
        assert!(err.contains("expected 32"));
    }

    #[test]
    fn u256_text_parsing() {
        let v = u256_from_text("340282366920938463463374607431768211456", "listing.price").unwrap();
        assert_eq!(v, U256::from(1u8) << 128);
        assert!(u256_from_text("not-a-number", "listing.price").is_err());
    }
}
