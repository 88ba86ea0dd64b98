//! Static tier catalogue and quote computation.
//!
//! Prices are per listing, looked up by the size of the batch being paid for,
//! so larger batches get a lower unit price.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Bronze,
    Diamond,
    Platinum,
}

/// Property-count range used to look up the per-listing price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriceBucket {
    UpTo3,
    UpTo5,
    UpTo10,
    UpTo20,
    UpTo40,
    Over40,
}

impl PriceBucket {
    pub const ALL: [PriceBucket; 6] = [
        PriceBucket::UpTo3,
        PriceBucket::UpTo5,
        PriceBucket::UpTo10,
        PriceBucket::UpTo20,
        PriceBucket::UpTo40,
        PriceBucket::Over40,
    ];

    pub fn for_count(property_count: u32) -> AppResult<Self> {
        let bucket = match property_count {
            0 => {
                return Err(AppError::Validation(
                    "at least one property must be selected".to_string(),
                ))
            }
            1..=3 => PriceBucket::UpTo3,
            4..=5 => PriceBucket::UpTo5,
            6..=10 => PriceBucket::UpTo10,
            11..=20 => PriceBucket::UpTo20,
            21..=40 => PriceBucket::UpTo40,
            _ => PriceBucket::Over40,
        };
        Ok(bucket)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriceBucket::UpTo3 => "1-3",
            PriceBucket::UpTo5 => "4-5",
            PriceBucket::UpTo10 => "6-10",
            PriceBucket::UpTo20 => "11-20",
            PriceBucket::UpTo40 => "21-40",
            PriceBucket::Over40 => ">40",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Bronze, Tier::Diamond, Tier::Platinum];

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Bronze => "Bronze",
            Tier::Diamond => "Diamond",
            Tier::Platinum => "Platinum",
        }
    }

    /// How long listings paid under this tier stay live.
    pub fn duration_days(&self) -> i64 {
        match self {
            Tier::Bronze => 30,
            Tier::Diamond => 30,
            Tier::Platinum => 60,
        }
    }

    pub fn features(&self) -> &'static [&'static str] {
        match self {
            Tier::Bronze => &[
                "Listing visible in search results",
                "Up to 10 photos per listing",
                "Email support",
            ],
            Tier::Diamond => &[
                "Everything in Bronze",
                "Highlighted in search results",
                "Up to 30 photos per listing",
                "Listing performance insights",
            ],
            Tier::Platinum => &[
                "Everything in Diamond",
                "Featured on the home page",
                "Unlimited photos and video tours",
                "Priority support",
            ],
        }
    }

    fn price_table(&self) -> &'static [i64; 6] {
        match self {
            Tier::Bronze => &[500, 450, 400, 350, 300, 250],
            Tier::Diamond => &[1500, 1250, 1000, 900, 800, 700],
            Tier::Platinum => &[2500, 2250, 2000, 1800, 1600, 1400],
        }
    }

    pub fn unit_price(&self, bucket: PriceBucket) -> i64 {
        self.price_table()[bucket.index()]
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bronze" => Ok(Tier::Bronze),
            "diamond" => Ok(Tier::Diamond),
            "platinum" => Ok(Tier::Platinum),
            other => Err(AppError::Validation(format!("unknown tier: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub tier: &'static str,
    pub bucket: &'static str,
    pub property_count: u32,
    pub unit_price: i64,
    pub base_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,
    pub total_amount: i64,
    pub savings: i64,
    pub duration_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierInfo {
    pub name: &'static str,
    pub duration_days: i64,
    pub features: &'static [&'static str],
    pub prices: Vec<BucketPrice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketPrice {
    pub bucket: &'static str,
    pub unit_price: i64,
}

pub struct PricingCatalog;

impl PricingCatalog {
    pub fn tiers() -> Vec<TierInfo> {
        Tier::ALL
            .iter()
            .map(|tier| TierInfo {
                name: tier.name(),
                duration_days: tier.duration_days(),
                features: tier.features(),
                prices: PriceBucket::ALL
                    .iter()
                    .map(|bucket| BucketPrice {
                        bucket: bucket.label(),
                        unit_price: tier.unit_price(*bucket),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Round `base * (1 - percentage/100)` to the nearest whole currency unit.
    pub fn apply_discount(base_amount: i64, percentage: f64) -> AppResult<i64> {
        if !(percentage > 0.0 && percentage <= 100.0) {
            return Err(AppError::Validation(format!(
                "discount percentage must be in (0, 100], got {}",
                percentage
            )));
        }
        let discounted = (base_amount as f64 * (1.0 - percentage / 100.0)).round() as i64;
        Ok(discounted.clamp(0, base_amount))
    }

    pub fn quote(
        property_count: u32,
        tier: Tier,
        discount_percentage: Option<f64>,
    ) -> AppResult<Quote> {
        let bucket = PriceBucket::for_count(property_count)?;
        let unit_price = tier.unit_price(bucket);
        let base_amount = unit_price
            .checked_mul(property_count as i64)
            .ok_or_else(|| AppError::Validation("property count too large".to_string()))?;

        let total_amount = match discount_percentage {
            Some(pct) => Self::apply_discount(base_amount, pct)?,
            None => base_amount,
        };

        Ok(Quote {
            tier: tier.name(),
            bucket: bucket.label(),
            property_count,
            unit_price,
            base_amount,
            discount_percentage,
            total_amount,
            savings: base_amount - total_amount,
            duration_days: tier.duration_days(),
        })
    }
}
