//! Normalized property payload handed to the property store.
//!
//! The enumerations here are the fixed recognized sets for the `property_type`,
//! `listing_type` and `status` columns of a bulk upload. Parsing is exact on the
//! lower-case snake_case spelling; the backend normalizes raw cell text first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Declares a closed string enumeration with `ALL`, `as_str`, `Display` and `FromStr`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

string_enum!(
    /// Kind of building or lot being listed.
    PropertyType {
        Apartment => "apartment",
        House => "house",
        Condo => "condo",
        Townhouse => "townhouse",
        Villa => "villa",
        Land => "land",
        Commercial => "commercial",
    }
);

string_enum!(
    /// Whether the property is offered for sale or for rent.
    ListingType {
        Sale => "sale",
        Rent => "rent",
    }
);

string_enum!(
    /// Market status of a listing. Uploads default to `Available`.
    PropertyStatus {
        Available => "available",
        Pending => "pending",
        Sold => "sold",
        Rented => "rented",
    }
);

impl Default for PropertyStatus {
    fn default() -> Self {
        PropertyStatus::Available
    }
}

/// A validated, normalized property row ready for persistence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub title: String,
    pub description: Option<String>,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    pub status: PropertyStatus,
    pub price: f64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: Option<String>,
    pub bedrooms: u32,
    pub bathrooms: f64,
    /// Floor or lot area, always strictly positive.
    pub area: f64,
    pub amenities: Vec<String>,
}
