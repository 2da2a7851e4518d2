//! Identifiers owned by the excluded share/space subsystem.
//!
//! All are plain integer ids in the relational schema. They are wrapped so a
//! tenant id can never be passed where a post id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Identifier of a tenant ("space").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

/// Identifier of a post ("share").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

/// Identifier of an application user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

macro_rules! id_impls {
    ($ty:ident) => {
        impl $ty {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $ty {
            fn from(value: i64) -> Self {
                $ty(value)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<i64>().map($ty)
            }
        }
    };
}

id_impls!(TenantId);
id_impls!(PostId);
id_impls!(UserId);
