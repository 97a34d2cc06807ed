//! TiKV keys for the rows of a table.

use std::fmt;

use super::memcomparable::{decode_bytes, decode_int, encode_bytes, encode_int};
use crate::error::{CtlError, Result};

const TABLE_PREFIX: u8 = b't';
const RECORD_PREFIX_SEP: &[u8] = b"_r";

const TABLE_PREFIX_LEN: usize = 1 + 8;
const TABLE_RECORD_PREFIX_LEN: usize = TABLE_PREFIX_LEN + 2;
const TABLE_ROW_LEN: usize = TABLE_RECORD_PREFIX_LEN + 8;

/// Where a key sits relative to the rows of its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryStatus {
    /// Key of a real row.
    Normal,
    /// Lowest key of the table, before any row.
    LowSentinel,
    /// Exclusive upper edge of the table, i.e. the lowest key of the next table.
    HighSentinel,
}

/// A decoded table row key.
///
/// `TableEnd` is encoded with the id of the *next* table, so its raw bytes
/// are indistinguishable from a bare prefix of `table_id + 1`. Decoding
/// reports the table the key closes; use [`TableRowKey::encoded_table_id`]
/// for the id actually present in the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableRowKey {
    Row { table_id: i64, row_id: i64 },
    TableStart { table_id: i64 },
    TableEnd { table_id: i64 },
}

impl TableRowKey {
    /// Build a key from its parts. `row_id` is ignored for sentinels.
    pub fn new(table_id: i64, row_id: i64, status: BoundaryStatus) -> Self {
        match status {
            BoundaryStatus::Normal => TableRowKey::Row { table_id, row_id },
            BoundaryStatus::LowSentinel => TableRowKey::TableStart { table_id },
            BoundaryStatus::HighSentinel => TableRowKey::TableEnd { table_id },
        }
    }

    pub fn table_id(&self) -> i64 {
        match *self {
            TableRowKey::Row { table_id, .. }
            | TableRowKey::TableStart { table_id }
            | TableRowKey::TableEnd { table_id } => table_id,
        }
    }

    /// The table id written into the key bytes.
    ///
    /// Fails for the end of table `i64::MAX`, which has no key.
    pub fn encoded_table_id(&self) -> Result<i64> {
        match *self {
            TableRowKey::TableEnd { table_id } => table_id.checked_add(1).ok_or_else(|| {
                CtlError::malformed_key(
                    format!("end of table {}", table_id),
                    "table id out of range",
                )
            }),
            _ => Ok(self.table_id()),
        }
    }

    pub fn row_id(&self) -> Option<i64> {
        match *self {
            TableRowKey::Row { row_id, .. } => Some(row_id),
            _ => None,
        }
    }

    pub fn status(&self) -> BoundaryStatus {
        match self {
            TableRowKey::Row { .. } => BoundaryStatus::Normal,
            TableRowKey::TableStart { .. } => BoundaryStatus::LowSentinel,
            TableRowKey::TableEnd { .. } => BoundaryStatus::HighSentinel,
        }
    }

    /// Encode into the wrapped key used by TiKV and PD.
    pub fn encode(&self) -> Result<TikvKey> {
        let mut raw = Vec::with_capacity(TABLE_ROW_LEN);
        raw.push(TABLE_PREFIX);
        encode_int(&mut raw, self.encoded_table_id()?);
        match *self {
            TableRowKey::Row { row_id, .. } => {
                raw.extend_from_slice(RECORD_PREFIX_SEP);
                encode_int(&mut raw, row_id);
            }
            TableRowKey::TableStart { .. } => raw.extend_from_slice(RECORD_PREFIX_SEP),
            TableRowKey::TableEnd { .. } => {}
        }

        let mut key = Vec::with_capacity(raw.len() / 8 * 9 + 9);
        encode_bytes(&mut key, &raw);
        Ok(TikvKey(key))
    }

    /// Decode a wrapped key, rejecting anything that is not a row key or a
    /// table boundary.
    pub fn decode(key: &TikvKey) -> Result<Self> {
        let (_, raw) = decode_bytes(&key.0)?;
        let malformed = |reason: String| CtlError::malformed_key(key.to_pd_key(), reason);

        if raw.first() != Some(&TABLE_PREFIX) {
            return Err(malformed("missing table prefix".to_string()));
        }
        match raw.len() {
            TABLE_PREFIX_LEN => {
                let (_, encoded) = decode_int(&raw[1..])?;
                let table_id = encoded
                    .checked_sub(1)
                    .ok_or_else(|| malformed(format!("table id {} has no owner", encoded)))?;
                Ok(TableRowKey::TableEnd { table_id })
            }
            TABLE_RECORD_PREFIX_LEN => {
                if &raw[TABLE_PREFIX_LEN..] != RECORD_PREFIX_SEP {
                    return Err(malformed("invalid row prefix".to_string()));
                }
                let (_, table_id) = decode_int(&raw[1..])?;
                Ok(TableRowKey::TableStart { table_id })
            }
            TABLE_ROW_LEN => {
                if &raw[TABLE_PREFIX_LEN..TABLE_RECORD_PREFIX_LEN] != RECORD_PREFIX_SEP {
                    return Err(malformed("invalid row prefix".to_string()));
                }
                let (_, table_id) = decode_int(&raw[1..])?;
                let (_, row_id) = decode_int(&raw[TABLE_RECORD_PREFIX_LEN..])?;
                Ok(TableRowKey::Row { table_id, row_id })
            }
            n => Err(malformed(format!("size not fit, actual is {}", n))),
        }
    }
}

/// Encode a table row key from its parts.
pub fn encode(table_id: i64, row_id: i64, status: BoundaryStatus) -> Result<TikvKey> {
    TableRowKey::new(table_id, row_id, status).encode()
}

/// Decode a table row key.
pub fn decode(key: &TikvKey) -> Result<TableRowKey> {
    TableRowKey::decode(key)
}

/// A raw (wrapped) TiKV key.
///
/// PD exchanges these as upper-case hex strings. The empty key is the edge of
/// the whole key space.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TikvKey(Vec<u8>);

impl TikvKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse the hex form PD returns in `start_key` / `end_key`.
    pub fn from_pd_key(pd_key: &str) -> Result<Self> {
        hex::decode(pd_key)
            .map(Self)
            .map_err(|e| CtlError::malformed_key(pd_key, format!("invalid hex: {}", e)))
    }

    pub fn to_pd_key(&self) -> String {
        hex::encode_upper(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode as a table row key.
    pub fn table_row(&self) -> Result<TableRowKey> {
        TableRowKey::decode(self)
    }

    /// The table id written right after the table prefix, whatever follows it.
    ///
    /// No adjustment is made for table end keys: the end key of table `t`
    /// reports `t + 1` here.
    pub fn table_id_prefix(&self) -> Result<i64> {
        let (_, raw) = decode_bytes(&self.0)?;
        if raw.len() < TABLE_PREFIX_LEN || raw[0] != TABLE_PREFIX {
            return Err(CtlError::malformed_key(
                self.to_pd_key(),
                "not a table key",
            ));
        }
        let (_, table_id) = decode_int(&raw[1..])?;
        Ok(table_id)
    }
}

impl fmt::Display for TikvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pd_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_key_matches_pd() {
        const PD_KEY: &str = "7480000000000000FF375F72830000003DFF3FEC150000000000FA";
        let key = TikvKey::from_pd_key(PD_KEY).unwrap();
        assert_eq!(key.to_pd_key(), PD_KEY);

        let row = key.table_row().unwrap();
        assert_eq!(
            row,
            TableRowKey::Row {
                table_id: 55,
                row_id: 216172783141383189
            }
        );
        assert_eq!(row.encode().unwrap(), key);
        assert_eq!(encode(55, 216172783141383189, BoundaryStatus::Normal).unwrap(), key);
    }

    #[test]
    fn test_table_start_key_matches_pd() {
        const PD_KEY: &str = "7480000000000000FFEC5F720000000000FA";
        let key = TikvKey::from_pd_key(PD_KEY).unwrap();
        let row = key.table_row().unwrap();
        assert_eq!(row, TableRowKey::TableStart { table_id: 236 });
        assert_eq!(row.status(), BoundaryStatus::LowSentinel);
        assert_eq!(row.encode().unwrap().to_pd_key(), PD_KEY);
    }

    #[test]
    fn test_table_end_key_reports_owning_table() {
        const PD_KEY: &str = "7480000000000000FFED00000000000000F8";
        let key = TikvKey::from_pd_key(PD_KEY).unwrap();
        let row = key.table_row().unwrap();
        assert_eq!(row, TableRowKey::TableEnd { table_id: 236 });
        assert_eq!(row.status(), BoundaryStatus::HighSentinel);
        assert_eq!(row.encoded_table_id().unwrap(), 237);
        assert_eq!(key.table_id_prefix().unwrap(), 237);
        assert_eq!(
            encode(236, 0, BoundaryStatus::HighSentinel).unwrap().to_pd_key(),
            PD_KEY
        );
    }

    #[test]
    fn test_round_trip_all_statuses() {
        for table_id in [0i64, 1, 55, 236, 1 << 40] {
            for row_id in [i64::MIN, -7, 0, 1, 500, i64::MAX] {
                for status in [
                    BoundaryStatus::Normal,
                    BoundaryStatus::LowSentinel,
                    BoundaryStatus::HighSentinel,
                ] {
                    let decoded = decode(&encode(table_id, row_id, status).unwrap()).unwrap();
                    assert_eq!(decoded.table_id(), table_id);
                    assert_eq!(decoded.status(), status);
                    if status == BoundaryStatus::Normal {
                        assert_eq!(decoded.row_id(), Some(row_id));
                    }
                }
            }
        }
    }

    #[test]
    fn test_row_keys_sort_by_row_id() {
        let rows = [i64::MIN, -500, -1, 0, 1, 499, 500, 501, i64::MAX];
        for pair in rows.windows(2) {
            let a = encode(55, pair[0], BoundaryStatus::Normal).unwrap();
            let b = encode(55, pair[1], BoundaryStatus::Normal).unwrap();
            assert!(a < b, "{} !< {}", pair[0], pair[1]);
        }
        let start = encode(55, 0, BoundaryStatus::LowSentinel).unwrap();
        let end = encode(55, 0, BoundaryStatus::HighSentinel).unwrap();
        assert!(start < encode(55, i64::MIN, BoundaryStatus::Normal).unwrap());
        assert!(encode(55, i64::MAX, BoundaryStatus::Normal).unwrap() < end);
    }

    #[test]
    fn test_rejects_unexpected_sizes() {
        // raw lengths other than 9, 11 and 19
        for raw_len in [0usize, 1, 8, 10, 12, 18, 20, 27] {
            let mut raw = vec![b't'];
            raw.resize(raw_len.max(1), 0x80);
            raw.truncate(raw_len);
            let mut wrapped = Vec::new();
            encode_bytes(&mut wrapped, &raw);
            let err = decode(&TikvKey::from_bytes(wrapped)).unwrap_err();
            assert!(matches!(err, CtlError::MalformedKey { .. }), "len {}", raw_len);
        }
    }

    #[test]
    fn test_rejects_index_key() {
        // 't' + table id + "_i" + index id: same length as a row key
        let mut raw = vec![b't'];
        encode_int(&mut raw, 55);
        raw.extend_from_slice(b"_i");
        encode_int(&mut raw, 1);
        let mut wrapped = Vec::new();
        encode_bytes(&mut wrapped, &raw);
        let key = TikvKey::from_bytes(wrapped);

        match key.table_row() {
            Err(CtlError::MalformedKey { key: hex, reason }) => {
                assert_eq!(hex, key.to_pd_key());
                assert!(reason.contains("row prefix"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(key.table_id_prefix().unwrap(), 55);
    }

    #[test]
    fn test_table_prefix_of_min_id_has_no_owner() {
        // 't' + EncodeInt(i64::MIN): a 9-byte table prefix with nothing before it
        let key = TikvKey::from_pd_key("7400000000000000FF0000000000000000F8").unwrap();
        assert!(matches!(key.table_row(), Err(CtlError::MalformedKey { .. })));
        assert_eq!(key.table_id_prefix().unwrap(), i64::MIN);
    }

    #[test]
    fn test_end_of_max_table_cannot_be_encoded() {
        let end = TableRowKey::TableEnd { table_id: i64::MAX };
        assert!(matches!(end.encoded_table_id(), Err(CtlError::MalformedKey { .. })));
        assert!(encode(i64::MAX, 0, BoundaryStatus::HighSentinel).is_err());
        assert!(encode(i64::MAX, 0, BoundaryStatus::LowSentinel).is_ok());
    }

    #[test]
    fn test_rejects_bad_hex_and_empty_key() {
        assert!(TikvKey::from_pd_key("XYZ").is_err());
        let empty = TikvKey::from_pd_key("").unwrap();
        assert!(empty.is_empty());
        assert!(empty.table_row().is_err());
        assert!(empty.table_id_prefix().is_err());
    }
}
