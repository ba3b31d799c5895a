use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map, rest, value},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded, separated_pair},
    IResult,
};

pub(crate) fn env_key(line: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_ascii_whitespace() && c != ':')(line)
}

/// A `Key: value` line, with surrounding whitespace stripped from the value
pub(crate) fn env_entry(line: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        preceded(space0, env_key),
        preceded(space0, char(':')),
        map(rest, str::trim),
    )(line)
}

fn list_separator(input: &str) -> IResult<&str, ()> {
    alt((
        value((), delimited(space0, char(','), space0)),
        value((), space1),
    ))(input)
}

/// Numbers separated by commas and/or whitespace
pub(crate) fn double_list(input: &str) -> IResult<&str, Vec<f64>> {
    all_consuming(delimited(
        space0,
        separated_list1(list_separator, double),
        space0,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry() {
        assert_eq!(env_entry("NBINSX: 4"), Ok(("", ("NBINSX", "4"))));
        assert_eq!(
            env_entry("  TITLEX :p_{T}^{#gamma} [GeV]  "),
            Ok(("", ("TITLEX", "p_{T}^{#gamma} [GeV]")))
        );
        assert_eq!(env_entry("Key.Sub:"), Ok(("", ("Key.Sub", ""))));
        assert!(env_entry("no colon here").is_err());
    }

    #[test]
    fn lists() {
        assert_eq!(double_list("1,2, 3.5"), Ok(("", vec![1., 2., 3.5])));
        assert_eq!(double_list(" 1 2\t-3e1 "), Ok(("", vec![1., 2., -30.])));
        assert!(double_list("1,,2").is_err());
        assert!(double_list("").is_err());
        assert!(double_list("1, a").is_err());
    }
}
