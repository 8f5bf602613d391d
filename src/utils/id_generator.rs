// src/utils/id_generator.rs
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    Trip,
    Driver,
    Cooperative,
    Farmer,
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Trip => "trp",
            IdType::Driver => "drv",
            IdType::Cooperative => "cop",
            IdType::Farmer => "frm",
        }
    }

    pub fn from_prefix(prefix: &str) -> Result<Self, IdError> {
        match prefix {
            "trp" => Ok(IdType::Trip),
            "drv" => Ok(IdType::Driver),
            "cop" => Ok(IdType::Cooperative),
            "frm" => Ok(IdType::Farmer),
            other => Err(IdError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefix())
    }
}

pub struct IdGenerator;

impl IdGenerator {
    /// Generate a unique ID with format: {prefix}-{yymmdd}-{random_suffix}
    /// The suffix is 5 characters: 3 hex + 2 alphanumeric, or 3 alphanumeric + 2 hex.
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let date_part = timestamp.format("%y%m%d").to_string();
        let random_suffix = Self::generate_random_suffix();

        format!("{}-{}-{}", id_type.to_prefix(), date_part, random_suffix)
    }

    fn generate_random_suffix() -> String {
        if rand::random::<bool>() {
            format!(
                "{}{}",
                Self::generate_hex_chars(3),
                Self::generate_alphanumeric_chars(2)
            )
        } else {
            format!(
                "{}{}",
                Self::generate_alphanumeric_chars(3),
                Self::generate_hex_chars(2)
            )
        }
    }

    fn generate_hex_chars(n: usize) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        Self::generate_from_chars(HEX_CHARS, n)
    }

    fn generate_alphanumeric_chars(n: usize) -> String {
        const ALPHANUMERIC_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        Self::generate_from_chars(ALPHANUMERIC_CHARS, n)
    }

    fn generate_from_chars(charset: &[u8], n: usize) -> String {
        use rand::Rng;

        let mut rng = rand::rng();
        (0..n)
            .map(|_| charset[rng.random_range(0..charset.len())] as char)
            .collect()
    }

    /// Parse an ID into its components.
    pub fn parse_id(id: &str) -> Result<ParsedId, IdError> {
        let parts: Vec<&str> = id.split('-').collect();
        if parts.len() != 3 {
            return Err(IdError::InvalidFormat);
        }

        let (prefix, date_part, random_suffix) = (parts[0], parts[1], parts[2]);

        if date_part.len() != 6 || random_suffix.len() != 5 {
            return Err(IdError::InvalidFormat);
        }
        if !random_suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdError::InvalidFormat);
        }
        // Byte slicing below needs an ASCII date part.
        if !date_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdError::InvalidDate);
        }

        let id_type = IdType::from_prefix(prefix)?;

        let year = 2000 + date_part[0..2].parse::<i32>().map_err(|_| IdError::InvalidDate)?;
        let month = date_part[2..4].parse::<u32>().map_err(|_| IdError::InvalidDate)?;
        let day = date_part[4..6].parse::<u32>().map_err(|_| IdError::InvalidDate)?;

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(IdError::InvalidDate);
        }

        Ok(ParsedId {
            id_type,
            year,
            month,
            day,
            random_suffix: random_suffix.to_string(),
        })
    }

    /// Validate that an ID is well formed and, when given, of the expected type.
    pub fn validate_id(id: &str, expected_type: Option<IdType>) -> bool {
        match Self::parse_id(id) {
            Ok(parsed) => expected_type.is_none_or(|expected| parsed.id_type == expected),
            Err(_) => false,
        }
    }

    /// Short human-facing code printed on waybills, e.g. `HL-7QK2M9XA`.
    pub fn generate_tracking_code() -> String {
        const ALPHABET: [char; 32] = [
            'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R',
            'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '2', '3', '4', '5', '6', '7', '8', '9',
        ];
        format!("HL-{}", nanoid::nanoid!(8, &ALPHABET))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedId {
    pub id_type: IdType,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub random_suffix: String,
}

impl ParsedId {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, 0, 0, 0).single()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("Invalid ID format")]
    InvalidFormat,

    #[error("Unknown ID type: {0}")]
    UnknownType(String),

    #[error("Invalid date component in ID")]
    InvalidDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let trip_id = IdGenerator::generate(IdType::Trip);
        assert!(trip_id.starts_with("trp-"));
        assert_eq!(trip_id.split('-').count(), 3);

        assert!(IdGenerator::generate(IdType::Cooperative).starts_with("cop-"));
        assert!(IdGenerator::generate(IdType::Farmer).starts_with("frm-"));
    }

    #[test]
    fn test_id_parsing() {
        let test_date = Utc.with_ymd_and_hms(2025, 12, 7, 0, 0, 0).unwrap();
        let id = IdGenerator::generate_with_timestamp(IdType::Driver, test_date);

        let parsed = IdGenerator::parse_id(&id).unwrap();
        assert_eq!(parsed.id_type, IdType::Driver);
        assert_eq!(parsed.year, 2025);
        assert_eq!(parsed.month, 12);
        assert_eq!(parsed.day, 7);
        assert_eq!(parsed.random_suffix.len(), 5);
        assert_eq!(parsed.to_datetime(), Some(test_date));
    }

    #[test]
    fn test_validation() {
        let valid_id = "trp-251207-a1b2c";
        assert!(IdGenerator::validate_id(valid_id, Some(IdType::Trip)));
        assert!(!IdGenerator::validate_id(valid_id, Some(IdType::Driver)));
        assert!(IdGenerator::validate_id(valid_id, None));

        assert!(!IdGenerator::validate_id("invalid-format", None));
        assert!(!IdGenerator::validate_id("trp-251307-a1b2c", None));
        assert!(matches!(
            IdGenerator::parse_id("usr-251207-a1b2c"),
            Err(IdError::UnknownType(_))
        ));
    }

    #[test]
    fn test_non_ascii_date_part_is_rejected() {
        // Six bytes but only five chars, with a char boundary inside 0..2.
        let id = "trp-1\u{e9}234-abcde";
        assert_eq!(id.split('-').nth(1).map(str::len), Some(6));
        assert!(!IdGenerator::validate_id(id, Some(IdType::Trip)));
        assert!(matches!(IdGenerator::parse_id(id), Err(IdError::InvalidDate)));

        assert!(matches!(IdGenerator::parse_id("trp-2512+7-a1b2c"), Err(IdError::InvalidDate)));
    }

    #[test]
    fn test_random_suffix_pattern() {
        for _ in 0..100 {
            let suffix = IdGenerator::generate_random_suffix();
            assert_eq!(suffix.len(), 5);
            assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()), "bad suffix: {}", suffix);
        }
    }

    #[test]
    fn test_tracking_code_shape() {
        let code = IdGenerator::generate_tracking_code();
        assert!(code.starts_with("HL-"));
        assert_eq!(code.len(), 11);
        assert!(!code.contains('O') && !code.contains('0'));
    }
}
