use serde::{Deserialize, Serialize};

/// Billing rule attached to a session plan. Catalogs in the wild carry
/// free-text rate types, so anything outside the two known kinds is kept
/// verbatim and bills as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RateKind {
    Flat,
    Percentage,
    Unknown(String),
}

impl RateKind {
    pub fn parse(s: &str) -> RateKind {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => RateKind::Flat,
            "percentage" => RateKind::Percentage,
            _ => RateKind::Unknown(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RateKind::Flat => "flat",
            RateKind::Percentage => "percentage",
            RateKind::Unknown(s) => s.as_str(),
        }
    }
}

impl From<String> for RateKind {
    fn from(s: String) -> Self {
        RateKind::parse(&s)
    }
}

impl From<RateKind> for String {
    fn from(k: RateKind) -> String {
        k.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRate {
    pub kind: RateKind,
    pub rate: Option<f64>,
}

/// Which side of the relation's fee table a student bills against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locality {
    Local,
    International,
}

impl Locality {
    pub fn parse(s: &str) -> Option<Locality> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Locality::Local),
            "international" => Some(Locality::International),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locality::Local => "Local",
            Locality::International => "International",
        }
    }
}

/// Session fee for one student.
///
/// A missing plan or missing rate is a recoverable data gap, not an error:
/// the fee is zero and the caller surfaces a warning. Unknown rate kinds
/// fall through to zero the same way.
pub fn compute_fee(plan: Option<&SessionRate>, base_amount: f64) -> f64 {
    let Some(plan) = plan else {
        return 0.0;
    };
    let Some(rate) = plan.rate else {
        return 0.0;
    };
    match plan.kind {
        RateKind::Flat => rate,
        RateKind::Percentage => base_amount * (rate / 100.0),
        RateKind::Unknown(_) => 0.0,
    }
}

/// Base amount for a student: the local or international side of the
/// relation's fee table, per the student's locality choice.
pub fn base_amount(locality: Locality, local_amount: f64, international_amount: f64) -> f64 {
    match locality {
        Locality::Local => local_amount,
        Locality::International => international_amount,
    }
}

/// Catalog amounts arrive as numbers or as numeric strings ("1000", "950.5").
/// Anything unparsable bills as zero rather than failing the import.
pub fn parse_amount(v: Option<&serde_json::Value>) -> f64 {
    match v {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(kind: &str, rate: Option<f64>) -> SessionRate {
        SessionRate {
            kind: RateKind::parse(kind),
            rate,
        }
    }

    #[test]
    fn flat_rate_ignores_base_amount() {
        assert_eq!(compute_fee(Some(&plan("flat", Some(50.0))), 0.0), 50.0);
        assert_eq!(compute_fee(Some(&plan("flat", Some(50.0))), 99999.0), 50.0);
    }

    #[test]
    fn percentage_rate_scales_base_amount() {
        assert_eq!(compute_fee(Some(&plan("percentage", Some(10.0))), 200.0), 20.0);
        assert_eq!(compute_fee(Some(&plan("percentage", Some(0.0))), 200.0), 0.0);
    }

    #[test]
    fn degenerate_inputs_bill_zero() {
        assert_eq!(compute_fee(None, 200.0), 0.0);
        assert_eq!(compute_fee(Some(&plan("flat", None)), 200.0), 0.0);
        assert_eq!(compute_fee(Some(&plan("bogus", Some(5.0))), 200.0), 0.0);
    }

    #[test]
    fn fee_is_deterministic() {
        let p = plan("percentage", Some(12.5));
        let a = compute_fee(Some(&p), 840.0);
        let b = compute_fee(Some(&p), 840.0);
        assert_eq!(a, b);
        assert_eq!(a, 105.0);
    }

    #[test]
    fn locality_selects_fee_table_side() {
        assert_eq!(base_amount(Locality::Local, 700.0, 1000.0), 700.0);
        assert_eq!(base_amount(Locality::International, 700.0, 1000.0), 1000.0);
    }

    #[test]
    fn amounts_parse_leniently() {
        assert_eq!(parse_amount(Some(&json!("1000"))), 1000.0);
        assert_eq!(parse_amount(Some(&json!(950.5))), 950.5);
        assert_eq!(parse_amount(Some(&json!("n/a"))), 0.0);
        assert_eq!(parse_amount(Some(&json!(null))), 0.0);
        assert_eq!(parse_amount(None), 0.0);
    }

    #[test]
    fn rate_kind_round_trips_through_strings() {
        assert_eq!(RateKind::parse("Flat"), RateKind::Flat);
        assert_eq!(RateKind::parse("percentage"), RateKind::Percentage);
        assert_eq!(
            RateKind::parse("tiered"),
            RateKind::Unknown("tiered".to_string())
        );
        assert_eq!(RateKind::Flat.as_str(), "flat");
    }
}
