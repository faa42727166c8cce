use serde::{Deserialize, Serialize};

/// Ordered privilege level of a mission participant.
///
/// Levels are compared numerically: a principal satisfies a requirement when
/// its level is greater than or equal to the required one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeLevel {
    Public = 0,
    Volunteer = 1,
    Officer = 2,
    Director = 3,
    Chairman = 4,
    Owner = 5,
}

impl PrivilegeLevel {
    pub const ALL: [PrivilegeLevel; 6] = [
        PrivilegeLevel::Public,
        PrivilegeLevel::Volunteer,
        PrivilegeLevel::Officer,
        PrivilegeLevel::Director,
        PrivilegeLevel::Chairman,
        PrivilegeLevel::Owner,
    ];

    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.level() == level)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrivilegeLevel::Public => "public",
            PrivilegeLevel::Volunteer => "volunteer",
            PrivilegeLevel::Officer => "officer",
            PrivilegeLevel::Director => "director",
            PrivilegeLevel::Chairman => "chairman",
            PrivilegeLevel::Owner => "owner",
        }
    }

    pub fn satisfies(&self, required: PrivilegeLevel) -> bool {
        self >= &required
    }
}

impl core::fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(PrivilegeLevel::Owner > PrivilegeLevel::Chairman);
        assert!(PrivilegeLevel::Officer.satisfies(PrivilegeLevel::Volunteer));
        assert!(!PrivilegeLevel::Volunteer.satisfies(PrivilegeLevel::Officer));
        assert!(PrivilegeLevel::Public.satisfies(PrivilegeLevel::Public));
    }

    #[test]
    fn from_level_matches_numeric_value() {
        for l in PrivilegeLevel::ALL {
            assert_eq!(PrivilegeLevel::from_level(l.level()), Some(l));
        }
        assert_eq!(PrivilegeLevel::from_level(6), None);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&PrivilegeLevel::Director).unwrap();
        assert_eq!(json, "\"director\"");
    }
}
