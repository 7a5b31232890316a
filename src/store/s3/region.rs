//! AWS region table, consolidated from the two diverging copies found in
//! the teacher repo (`src/region.rs` and `src/s3/region/mod.rs`) into one
//! internally-consistent version.

use std::fmt;
use std::str::FromStr;

/// <https://docs.aws.amazon.com/general/latest/gr/rande.html#regional-endpoints>
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    AfSouth1,
    ApEast1,
    ApNortheast1,
    ApNortheast2,
    ApNortheast3,
    ApSouth1,
    ApSoutheast1,
    ApSoutheast2,
    CaCentral1,
    EuCentral1,
    EuNorth1,
    EuSouth1,
    EuWest1,
    EuWest2,
    EuWest3,
    MeSouth1,
    SaEast1,
    UsEast1,
    UsEast2,
    UsWest1,
    UsWest2,
    /// A non-AWS (or unlisted) region/endpoint pair, e.g. a MinIO or
    /// Backblaze B2 deployment.
    Custom { name: String, endpoint: String },
}

impl Region {
    /// Constructs the AWS variant matching `name`, falling back to
    /// `Custom` if unrecognized (used by tests and call sites that
    /// already know they want an AWS-shaped region).
    #[must_use]
    pub fn aws(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| Self::Custom {
            name: name.to_string(),
            endpoint: format!("s3.{name}.amazonaws.com"),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::AfSouth1 => "af-south-1",
            Self::ApEast1 => "ap-east-1",
            Self::ApNortheast1 => "ap-northeast-1",
            Self::ApNortheast2 => "ap-northeast-2",
            Self::ApNortheast3 => "ap-northeast-3",
            Self::ApSouth1 => "ap-south-1",
            Self::ApSoutheast1 => "ap-southeast-1",
            Self::ApSoutheast2 => "ap-southeast-2",
            Self::CaCentral1 => "ca-central-1",
            Self::EuCentral1 => "eu-central-1",
            Self::EuNorth1 => "eu-north-1",
            Self::EuSouth1 => "eu-south-1",
            Self::EuWest1 => "eu-west-1",
            Self::EuWest2 => "eu-west-2",
            Self::EuWest3 => "eu-west-3",
            Self::MeSouth1 => "me-south-1",
            Self::SaEast1 => "sa-east-1",
            Self::UsEast1 => "us-east-1",
            Self::UsEast2 => "us-east-2",
            Self::UsWest1 => "us-west-1",
            Self::UsWest2 => "us-west-2",
            Self::Custom { name, .. } => name,
        }
    }

    /// The virtual-hosted-style endpoint host for this region.
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self {
            Self::Custom { endpoint, .. } => endpoint.clone(),
            other => format!("s3.{}.amazonaws.com", other.name()),
        }
    }
}

impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "af-south-1" => Ok(Self::AfSouth1),
            "ap-east-1" => Ok(Self::ApEast1),
            "ap-northeast-1" => Ok(Self::ApNortheast1),
            "ap-northeast-2" => Ok(Self::ApNortheast2),
            "ap-northeast-3" => Ok(Self::ApNortheast3),
            "ap-south-1" => Ok(Self::ApSouth1),
            "ap-southeast-1" => Ok(Self::ApSoutheast1),
            "ap-southeast-2" => Ok(Self::ApSoutheast2),
            "ca-central-1" => Ok(Self::CaCentral1),
            "eu-central-1" => Ok(Self::EuCentral1),
            "eu-north-1" => Ok(Self::EuNorth1),
            "eu-south-1" => Ok(Self::EuSouth1),
            "eu-west-1" => Ok(Self::EuWest1),
            "eu-west-2" => Ok(Self::EuWest2),
            "eu-west-3" => Ok(Self::EuWest3),
            "me-south-1" => Ok(Self::MeSouth1),
            "sa-east-1" => Ok(Self::SaEast1),
            "us-east-1" => Ok(Self::UsEast1),
            "us-east-2" => Ok(Self::UsEast2),
            "us-west-1" => Ok(Self::UsWest1),
            "us-west-2" => Ok(Self::UsWest2),
            other => {
                // `xx-region-y.foo` shaped strings: treat as a custom
                // region whose name is the part before the first dot.
                if let Some((name, _)) = other.split_once('.') {
                    Ok(Self::Custom {
                        name: name.to_string(),
                        endpoint: other.to_string(),
                    })
                } else {
                    Err(ParseRegionError::new(s))
                }
            }
        }
    }
}

/// An error produced when attempting to convert a `str` into a `Region`
/// fails.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseRegionError {
    message: String,
}

impl ParseRegionError {
    #[must_use]
    pub fn new(input: &str) -> Self {
        Self {
            message: format!("not a valid AWS region: {input}"),
        }
    }
}

impl std::error::Error for ParseRegionError {}

impl fmt::Display for ParseRegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Default for Region {
    fn default() -> Self {
        match std::env::var("AWS_DEFAULT_REGION").or_else(|_| std::env::var("AWS_REGION")) {
            Ok(v) => Self::from_str(&v).unwrap_or(Self::UsEast1),
            Err(_) => Self::UsEast1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_regions() {
        assert_eq!("us-east-1".parse(), Ok(Region::UsEast1));
        assert_eq!("eu-west-3".parse(), Ok(Region::EuWest3));
    }

    #[test]
    fn unknown_plain_region_is_an_error() {
        assert!("not-a-region".parse::<Region>().is_err());
    }

    #[test]
    fn dotted_region_becomes_custom() {
        let r: Region = "xx-region-y.foo".parse().unwrap();
        assert_eq!(
            r,
            Region::Custom {
                name: "xx-region-y".to_string(),
                endpoint: "xx-region-y.foo".to_string(),
            }
        );
    }

    #[test]
    fn aws_helper_builds_standard_endpoint() {
        let r = Region::aws("eu-central-2");
        assert_eq!(r.endpoint(), "s3.eu-central-2.amazonaws.com");
    }
}
