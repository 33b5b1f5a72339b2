//! `.mcl` lists: selections of 1-based record numbers, one per line.

use std::{fmt, path::Path};

use crate::{Error, Result};

/// A strictly increasing list of 1-based method context numbers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MclList {
    numbers: Vec<u32>,
}

impl MclList {
    /// Parses `.mcl` text. Blank lines are ignored; surrounding whitespace is trimmed.
    ///
    /// ```rust
    /// use superpmi::MclList;
    ///
    /// let list = MclList::parse("1\n4\n\n9\n")?;
    /// assert!(list.contains(4));
    /// assert!(!list.contains(5));
    /// assert!(MclList::parse("3\n2\n").is_err());
    /// # Ok::<(), superpmi::Error>(())
    /// ```
    ///
    /// # Errors
    /// [`Error::InvalidMcl`] for entries that are not positive integers or do not increase.
    pub fn parse(text: &str) -> Result<Self> {
        let mut numbers: Vec<u32> = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }

            let number = entry.parse::<u32>().map_err(|_| Error::InvalidMcl {
                line: line_number,
                message: format!("'{entry}' is not a method context number"),
            })?;
            if number == 0 {
                return Err(Error::InvalidMcl {
                    line: line_number,
                    message: "method context numbers start at 1".to_string(),
                });
            }
            if let Some(&previous) = numbers.last() {
                if number <= previous {
                    return Err(Error::InvalidMcl {
                        line: line_number,
                        message: format!("{number} does not follow {previous}"),
                    });
                }
            }
            numbers.push(number);
        }
        Ok(MclList { numbers })
    }

    /// Reads and parses an `.mcl` file.
    ///
    /// # Errors
    /// I/O failures or [`Error::InvalidMcl`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Builds a list from record numbers.
    ///
    /// # Errors
    /// [`Error::InvalidMcl`] under the same rules as [`MclList::parse`].
    pub fn from_numbers(numbers: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut list = MclList::default();
        for (index, number) in numbers.into_iter().enumerate() {
            let increasing = match list.numbers.last() {
                Some(&previous) => previous < number,
                None => true,
            };
            if number == 0 || !increasing {
                return Err(Error::InvalidMcl {
                    line: index + 1,
                    message: format!("{number} breaks the strictly increasing order"),
                });
            }
            list.numbers.push(number);
        }
        Ok(list)
    }

    /// True if `number` is selected
    #[must_use]
    pub fn contains(&self, number: u32) -> bool {
        self.numbers.binary_search(&number).is_ok()
    }

    /// Selected numbers in increasing order
    #[must_use]
    pub fn numbers(&self) -> &[u32] {
        &self.numbers
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    /// True for an empty selection
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

impl fmt::Display for MclList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for number in &self.numbers {
            writeln!(f, "{number}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_sparse_lists() {
        let list = MclList::parse("1\n2\n1000\n4000000000\n").unwrap();
        assert_eq!(list.numbers(), &[1, 2, 1000, 4_000_000_000]);
        assert!(list.contains(1000));
        assert!(!list.contains(3));

        let single = MclList::parse("7").unwrap();
        assert_eq!(single.len(), 1);
        assert!(MclList::parse("\n  \n").unwrap().is_empty());
        assert_eq!(MclList::parse(" 3 \r\n5\r\n").unwrap().numbers(), &[3, 5]);
    }

    #[test]
    fn rejects_bad_lists() {
        let cases = [
            ("0\n1\n", 1),
            ("1\n1\n", 2),
            ("1\n5\n3\n", 3),
            ("1\nx\n", 2),
            ("-1\n", 1),
            ("1\n\n2.5\n", 3),
        ];
        for (text, expected_line) in cases {
            match MclList::parse(text) {
                Err(Error::InvalidMcl { line, .. }) => assert_eq!(line, expected_line, "{text:?}"),
                other => panic!("{text:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn display_roundtrip() {
        let list = MclList::from_numbers([2, 3, 10]).unwrap();
        assert_eq!(list.to_string(), "2\n3\n10\n");
        assert_eq!(MclList::parse(&list.to_string()).unwrap(), list);
        assert!(MclList::from_numbers([2, 2]).is_err());
        assert!(MclList::from_numbers([0]).is_err());
    }
}
