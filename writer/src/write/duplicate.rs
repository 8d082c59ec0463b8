use std::collections::HashSet;

use crate::error::{Error, Result};

/// Rejects the second occurrence of a property name within one structured
/// value. Names are compared exactly, without any normalization.
#[derive(Debug, Default)]
pub struct DuplicatePropertyNamesChecker {
    names: HashSet<String>,
}

impl DuplicatePropertyNamesChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, name: &str) -> Result<()> {
        if self.names.contains(name) {
            return Err(Error::DuplicateProperty {
                name: name.to_string(),
            });
        }
        self.names.insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_anywhere_fails() {
        let names = ["A", "B", "C", "D"];
        for duplicate in names {
            let mut checker = DuplicatePropertyNamesChecker::new();
            for name in names {
                checker.check(name).unwrap();
            }
            let err = checker.check(duplicate).unwrap_err();
            assert!(matches!(err, Error::DuplicateProperty { name } if name == duplicate));
        }
    }

    #[test]
    fn test_case_sensitive() {
        let mut checker = DuplicatePropertyNamesChecker::new();
        checker.check("Name").unwrap();
        checker.check("name").unwrap();
        checker.check("NAME").unwrap();
        assert!(checker.check("Name").is_err());
    }
}
