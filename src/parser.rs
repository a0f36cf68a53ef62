use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::alphanumeric1;
use nom::combinator::recognize;
use nom::multi::{many1_count, separated_list0};
use nom::number::complete::float;
use nom::sequence::separated_pair;
use nom::IResult;

//a field key is either a gas id (alphanumerics and underscores) or TEMP
fn parse_field_key(input: &str) -> IResult<&str, &str> {
	recognize(many1_count(alt((alphanumeric1, tag("_")))))(input)
}

//quantities are plain floats; validation happens at mixture construction
fn parse_quantity(input: &str) -> IResult<&str, f32> {
	float(input)
}

/// Parses gas specification strings of the `key=amount;key=amount` form used
/// by ambient and initial mixture definitions.
/// E.g: `"o2=21.8;n2=82.1;TEMP=293.15"` will return
/// `vec![("o2", 21.8_f32), ("n2", 82.1_f32), ("TEMP", 293.15_f32)]`.
/// Parsing stops at the first malformed field; callers decide whether
/// trailing input is an error.
pub fn parse_gas_string(input: &str) -> IResult<&str, Vec<(&str, f32)>> {
	separated_list0(
		tag(";"),
		separated_pair(parse_field_key, tag("="), parse_quantity),
	)(input)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_gas_fields_and_temperature() {
		let test_str = "o2=2500;plasma=5000;TEMP=370";
		let result = parse_gas_string(test_str).unwrap();

		assert_eq!(
			result,
			(
				"",
				vec![("o2", 2500_f32), ("plasma", 5000_f32), ("TEMP", 370_f32)]
			)
		);
	}

	#[test]
	fn parses_underscored_ids() {
		let (rest, fields) = parse_gas_string("water_vapor=3.5").unwrap();
		assert_eq!(rest, "");
		assert_eq!(fields, vec![("water_vapor", 3.5_f32)]);
	}

	#[test]
	fn stops_at_malformed_fields() {
		let (rest, fields) = parse_gas_string("o2=14;;n2=7").unwrap();
		assert_eq!(fields, vec![("o2", 14_f32)]);
		assert_eq!(rest, ";;n2=7");
	}

	#[test]
	fn empty_input_is_empty() {
		let (rest, fields) = parse_gas_string("").unwrap();
		assert!(rest.is_empty());
		assert!(fields.is_empty());
	}
}
