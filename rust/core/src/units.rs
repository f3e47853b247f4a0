// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unit extraction and conversion for STEP files
//!
//! Geometry downstream is expressed in millimetres. Length units are declared
//! in complex instances such as
//! `#5=( LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.MILLI.,.METRE.) );`
//! which the tokenizer does not decode, so they are scanned as raw text.

use crate::parser::EntityScanner;

/// ISO-10303-41 prefixes as powers of ten
const SI_PREFIXES: [(&str, i32); 16] = [
    ("EXA", 18),
    ("PETA", 15),
    ("TERA", 12),
    ("GIGA", 9),
    ("MEGA", 6),
    ("KILO", 3),
    ("HECTO", 2),
    ("DECA", 1),
    ("DECI", -1),
    ("CENTI", -2),
    ("MILLI", -3),
    ("MICRO", -6),
    ("NANO", -9),
    ("PICO", -12),
    ("FEMTO", -15),
    ("ATTO", -18),
];

/// Millimetres per `<prefix>METRE`; an empty or unknown prefix is the metre.
pub fn prefixed_metre_in_mm(prefix: &str) -> f64 {
    let exponent = SI_PREFIXES
        .iter()
        .find(|(name, _)| *name == prefix)
        .map_or(0, |&(_, e)| e);
    10f64.powi(exponent + 3)
}

/// Scale factor converting the file's length unit to millimetres
///
/// Returns 1.0 when no length unit is declared (millimetres are the STEP
/// convention for mechanical parts).
pub fn extract_length_unit_scale(content: &str) -> f64 {
    let mut scanner = EntityScanner::new(content);

    while let Some((_id, _type_name, start, end)) = scanner.next_entity() {
        let text = &content[start..end];
        if !text.contains("LENGTH_UNIT") {
            continue;
        }

        if let Some(name) = conversion_unit_name(text) {
            match name.to_ascii_uppercase().as_str() {
                "INCH" => return 25.4,
                "FOOT" => return 304.8,
                _ => {}
            }
        }

        if let Some(prefix) = si_unit_prefix(text) {
            return prefixed_metre_in_mm(prefix);
        }
    }

    1.0
}

/// Prefix of `SI_UNIT(.MILLI.,.METRE.)`; `SI_UNIT($,.METRE.)` yields ""
fn si_unit_prefix(text: &str) -> Option<&str> {
    let start = text.find("SI_UNIT(")? + "SI_UNIT(".len();
    let rest = &text[start..];
    let comma = rest.find(',')?;
    let unit = rest[comma + 1..].trim_start();
    if !unit.starts_with(".METRE.") {
        return None;
    }
    Some(rest[..comma].trim().trim_matches('.'))
}

/// Name of `CONVERSION_BASED_UNIT('INCH',#12)`
fn conversion_unit_name(text: &str) -> Option<&str> {
    let start = text.find("CONVERSION_BASED_UNIT(")? + "CONVERSION_BASED_UNIT(".len();
    let rest = text[start..].trim_start().strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_millimetre_file() {
        let content = "DATA;\n#5=( LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.MILLI.,.METRE.) );\nENDSEC;";
        assert_relative_eq!(extract_length_unit_scale(content), 1.0);
    }

    #[test]
    fn test_metre_file() {
        let content = "DATA;\n#5=( LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT($,.METRE.) );\nENDSEC;";
        assert_relative_eq!(extract_length_unit_scale(content), 1000.0);
    }

    #[test]
    fn test_inch_file() {
        let content = "DATA;\n#7=( CONVERSION_BASED_UNIT('INCH',#6) LENGTH_UNIT() NAMED_UNIT(#4) );\nENDSEC;";
        assert_relative_eq!(extract_length_unit_scale(content), 25.4);
    }

    #[test]
    fn test_no_unit_defaults_to_millimetres() {
        assert_relative_eq!(extract_length_unit_scale("DATA;\n#1=DIRECTION('',(1.,0.,0.));"), 1.0);
    }

    #[test]
    fn test_prefix_table() {
        assert_relative_eq!(prefixed_metre_in_mm("MILLI"), 1.0);
        assert_relative_eq!(prefixed_metre_in_mm("CENTI"), 10.0);
        assert_relative_eq!(prefixed_metre_in_mm(""), 1000.0);
        assert_relative_eq!(prefixed_metre_in_mm("MICRO"), 1e-3, epsilon = 1e-15);
    }
}
