use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde goes through the same strings, so JSON and SQLite agree.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub const ALL: &'static [$name] = &[$(Self::$variant),+];
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(Sex {
    Male => "male",
    Female => "female",
    Other => "other",
});

str_enum!(Department {
    Paediatrics => "paediatrics",
    Gynae => "gynae",
});

str_enum!(AppointmentStatus {
    Pending => "Pending",
    Completed => "Completed",
    Cancelled => "Cancelled",
});

str_enum!(LabLocation {
    InHouse => "inhouse",
    Outsourced => "outsource",
});

str_enum!(CollectionStatus {
    Pending => "Pending",
    Completed => "Completed",
});

str_enum!(DocumentKind {
    Prescription => "prescription",
    LabReport => "lab_report",
});

str_enum!(Role {
    Reception => "reception",
    Paeds => "paeds",
    Gynae => "gynae",
});

str_enum!(AboGroup {
    A => "A",
    B => "B",
    AB => "AB",
    O => "O",
});

str_enum!(Rhesus {
    Positive => "Positive",
    Negative => "Negative",
});

str_enum!(BinaryOutcome {
    Positive => "Positive",
    Negative => "Negative",
});

impl Role {
    /// Departments whose work this role sees. Reception sees everything.
    pub fn departments(&self) -> &'static [Department] {
        match self {
            Role::Reception => Department::ALL,
            Role::Paeds => &[Department::Paediatrics],
            Role::Gynae => &[Department::Gynae],
        }
    }
}

impl DocumentKind {
    /// Human label used in messages and file names.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Prescription => "Prescription",
            DocumentKind::LabReport => "Lab report",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trips_through_strings() {
        for sex in Sex::ALL {
            assert_eq!(Sex::from_str(sex.as_str()).unwrap(), *sex);
        }
        assert_eq!(AppointmentStatus::from_str("Completed").unwrap(), AppointmentStatus::Completed);
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = Department::from_str("cardiology").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn serde_uses_wire_strings() {
        let json = serde_json::to_string(&LabLocation::Outsourced).unwrap();
        assert_eq!(json, "\"outsource\"");
        let parsed: AppointmentStatus = serde_json::from_str("\"Pending\"").unwrap();
        assert_eq!(parsed, AppointmentStatus::Pending);
        assert!(serde_json::from_str::<Sex>("\"MALE\"").is_err());
    }

    #[test]
    fn reception_sees_all_departments() {
        assert_eq!(Role::Reception.departments().len(), 2);
        assert_eq!(Role::Paeds.departments(), &[Department::Paediatrics]);
        assert_eq!(Role::Gynae.departments(), &[Department::Gynae]);
    }
}
