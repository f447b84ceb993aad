//! The FizzBuzz computation.

use thiserror::Error;

/// Smallest accepted modulus and limit.
pub const MIN_VALUE: i64 = 1;

/// Largest accepted modulus and limit.
pub const MAX_VALUE: i64 = 100;

/// Inputs of one FizzBuzz run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FizzBuzzParams {
    /// Token for multiples of `int1`.
    pub string1: String,
    /// Token for multiples of `int2`.
    pub string2: String,
    pub int1: i64,
    pub int2: i64,
    /// Upper bound of the range, inclusive.
    pub limit: i64,
}

/// Invalid FizzBuzz inputs, reported in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FizzBuzzError {
    #[error("string1 required")]
    String1Required,

    #[error("string2 required")]
    String2Required,

    #[error("int1 must be between 1 and 100")]
    InvalidInt1,

    #[error("int2 must be between 1 and 100")]
    InvalidInt2,

    #[error("limit must be between 1 and 100")]
    InvalidLimit,
}

impl FizzBuzzParams {
    /// Check the inputs, first failure wins.
    pub fn validate(&self) -> Result<(), FizzBuzzError> {
        let in_range = |v: i64| (MIN_VALUE..=MAX_VALUE).contains(&v);

        if self.string1.is_empty() {
            return Err(FizzBuzzError::String1Required);
        }
        if self.string2.is_empty() {
            return Err(FizzBuzzError::String2Required);
        }
        if !in_range(self.int1) {
            return Err(FizzBuzzError::InvalidInt1);
        }
        if !in_range(self.int2) {
            return Err(FizzBuzzError::InvalidInt2);
        }
        if !in_range(self.limit) {
            return Err(FizzBuzzError::InvalidLimit);
        }
        Ok(())
    }
}

/// Validate `params` and map every integer in `1..=limit` to its token.
pub fn compute_range(params: &FizzBuzzParams) -> Result<Vec<String>, FizzBuzzError> {
    params.validate()?;

    let mapper = Mapper::new(params);
    Ok((1..=params.limit).map(|n| mapper.map(n)).collect())
}

struct Mapper<'a> {
    fizz: &'a str,
    buzz: &'a str,
    fizzbuzz: String,
    fizz_mod: i64,
    buzz_mod: i64,
}

impl<'a> Mapper<'a> {
    fn new(params: &'a FizzBuzzParams) -> Self {
        Self {
            fizz: &params.string1,
            buzz: &params.string2,
            fizzbuzz: format!("{}{}", params.string1, params.string2),
            fizz_mod: params.int1,
            buzz_mod: params.int2,
        }
    }

    fn map(&self, n: i64) -> String {
        match (n % self.fizz_mod == 0, n % self.buzz_mod == 0) {
            (true, true) => self.fizzbuzz.clone(),
            (true, false) => self.fizz.to_string(),
            (false, true) => self.buzz.to_string(),
            (false, false) => n.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: i64) -> FizzBuzzParams {
        FizzBuzzParams {
            string1: "fizz".into(),
            string2: "buzz".into(),
            int1: 3,
            int2: 5,
            limit,
        }
    }

    #[test]
    fn test_classic_range() {
        let range = compute_range(&params(16)).unwrap();
        assert_eq!(
            range,
            vec![
                "1", "2", "fizz", "4", "buzz", "fizz", "7", "8", "fizz", "buzz", "11", "fizz",
                "13", "14", "fizzbuzz", "16",
            ]
        );
    }

    #[test]
    fn test_same_modulus_always_concatenates() {
        let p = FizzBuzzParams {
            int1: 2,
            int2: 2,
            ..params(4)
        };
        assert_eq!(compute_range(&p).unwrap(), vec!["1", "fizzbuzz", "3", "fizzbuzz"]);
    }

    #[test]
    fn test_modulus_of_one_matches_everything() {
        let p = FizzBuzzParams {
            int1: 1,
            ..params(3)
        };
        assert_eq!(compute_range(&p).unwrap(), vec!["fizz", "fizz", "fizz"]);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(compute_range(&params(1)).unwrap().len(), 1);
        assert_eq!(compute_range(&params(100)).unwrap().len(), 100);
        assert_eq!(compute_range(&params(0)), Err(FizzBuzzError::InvalidLimit));
        assert_eq!(compute_range(&params(101)), Err(FizzBuzzError::InvalidLimit));
    }

    #[test]
    fn test_validation_order() {
        let all_wrong = FizzBuzzParams {
            string1: String::new(),
            string2: String::new(),
            int1: 0,
            int2: 0,
            limit: 0,
        };
        assert_eq!(all_wrong.validate(), Err(FizzBuzzError::String1Required));

        let p = FizzBuzzParams {
            string1: "f".into(),
            ..all_wrong
        };
        assert_eq!(p.validate(), Err(FizzBuzzError::String2Required));

        let p = FizzBuzzParams {
            string2: "b".into(),
            ..p
        };
        assert_eq!(p.validate(), Err(FizzBuzzError::InvalidInt1));

        let p = FizzBuzzParams { int1: 3, ..p };
        assert_eq!(p.validate(), Err(FizzBuzzError::InvalidInt2));

        let p = FizzBuzzParams { int2: 101, ..p };
        assert_eq!(p.validate(), Err(FizzBuzzError::InvalidInt2));
        assert_eq!(
            FizzBuzzError::InvalidInt2.to_string(),
            "int2 must be between 1 and 100"
        );
    }
}
