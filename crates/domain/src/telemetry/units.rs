//! Unit normalization into the backend's canonical units (W, kWh).

pub fn to_watts(value: f64, unit: Option<&str>) -> f64 {
    match unit {
        Some("kW") => value * 1_000.0,
        Some("MW") => value * 1_000_000.0,
        _ => value,
    }
}

pub fn to_kilowatt_hours(value: f64, unit: Option<&str>) -> f64 {
    match unit {
        Some("Wh") => value / 1_000.0,
        Some("MWh") => value * 1_000.0,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_watts() {
        assert_eq!(to_watts(1.5, Some("kW")), 1500.0);
        assert_eq!(to_watts(0.002, Some("MW")), 2000.0);
        assert_eq!(to_watts(230.0, Some("W")), 230.0);
        assert_eq!(to_watts(230.0, None), 230.0);
    }

    #[test]
    fn test_to_kilowatt_hours() {
        assert_eq!(to_kilowatt_hours(2500.0, Some("Wh")), 2.5);
        assert_eq!(to_kilowatt_hours(1.2, Some("MWh")), 1200.0);
        assert_eq!(to_kilowatt_hours(7.0, Some("kWh")), 7.0);
    }
}
