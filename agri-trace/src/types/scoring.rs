//! Scoring request / response exchanged with the external price scorer.

use serde::{Deserialize, Serialize};

use super::common::is_blank;

/// Price scoring request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub commodity: String,
    pub state: String,
    pub district: String,
    pub market: String,
    pub vendor_price: f64,
}

impl ScoringRequest {
    /// All text fields present and the price a finite number
    pub fn is_well_formed(&self) -> bool {
        ![&self.commodity, &self.state, &self.district, &self.market]
            .iter()
            .any(|f| is_blank(f))
            && self.vendor_price.is_finite()
    }
}

/// Scoring verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringStatus {
    Accept,
    Reject,
    Error,
}

/// Price scoring response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub status: ScoringStatus,
    /// Explanation; scorers report errors under `message`
    #[serde(default, alias = "message")]
    pub reason: String,
    /// Reference market price; absent on `error`
    #[serde(default)]
    pub market_modal_price: Option<f64>,
    /// Echo of the submitted price, when the scorer provides it
    #[serde(default)]
    pub vendor_price: Option<f64>,
}

impl ScoringResponse {
    pub fn accept(reason: impl Into<String>, market_modal_price: f64) -> Self {
        Self {
            status: ScoringStatus::Accept,
            reason: reason.into(),
            market_modal_price: Some(market_modal_price),
            vendor_price: None,
        }
    }

    pub fn reject(reason: impl Into<String>, market_modal_price: f64) -> Self {
        Self {
            status: ScoringStatus::Reject,
            reason: reason.into(),
            market_modal_price: Some(market_modal_price),
            vendor_price: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ScoringStatus::Error,
            reason: message.into(),
            market_modal_price: None,
            vendor_price: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ScoringStatus::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reject_response() {
        let raw = r#"{"status":"reject","reason":">10% higher than modal price","market_modal_price":1000.0,"vendor_price":1500.0}"#;
        let parsed: ScoringResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.status, ScoringStatus::Reject);
        assert_eq!(parsed.market_modal_price, Some(1000.0));
        assert!(!parsed.is_accepted());
    }

    #[test]
    fn test_error_message_alias() {
        let raw = r#"{"status":"error","message":"No market data available."}"#;
        let parsed: ScoringResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.status, ScoringStatus::Error);
        assert_eq!(parsed.reason, "No market data available.");
        assert_eq!(parsed.market_modal_price, None);
    }

    #[test]
    fn test_request_serialises_snake_case() {
        let request = ScoringRequest {
            commodity: "Wheat".into(),
            state: "Karnataka".into(),
            district: "Bangalore".into(),
            market: "Ramanagara".into(),
            vendor_price: 1500.0,
        };
        assert!(request.is_well_formed());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["vendor_price"], 1500.0);
        assert_eq!(json["commodity"], "Wheat");
    }

    #[test]
    fn test_request_well_formed_checks() {
        let mut request = ScoringRequest {
            commodity: " ".into(),
            state: "Karnataka".into(),
            district: "Bangalore".into(),
            market: "Ramanagara".into(),
            vendor_price: 1500.0,
        };
        assert!(!request.is_well_formed());
        request.commodity = "Wheat".into();
        request.vendor_price = f64::NAN;
        assert!(!request.is_well_formed());
    }
}
