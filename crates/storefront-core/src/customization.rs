//! # Customization Cost Resolver
//!
//! Maps the tailoring options attached to a cart line to a surcharge.
//!
//! ## Fixed Schema
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Customization (every field optional on the wire)                       │
//! │                                                                         │
//! │  lapelStyle    notched ·0   peak 25    shawl 35                         │
//! │  buttonCount   "2" ·0       "1" 15     "3" 10                           │
//! │  ventStyle     center ·0    none 0     side 15     double 25            │
//! │  pocketStyle   flap ·0      besom 20   patch 15                         │
//! │  liningColor   standard ·0  premium 30 luxury 50                        │
//! │  cuffStyle     button ·0    french 20  barrel 10                        │
//! │  fitType       regular ·0   slim 0     modern 15   classic 25           │
//! │  monogram      blank ·0     text 25    premium text 45                  │
//! │  alterations   each non-zero adjustment adds its fixed fee              │
//! │  rush          false ·0     true 30                                     │
//! │  notes         free                                                     │
//! │                                                                         │
//! │  · = no-op default                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The resolver is a pure function of the record. The client preview and
//! the server recomputation both call [`Customization::surcharge`]; there is
//! no other source of customization prices.
//!
//! Unknown option values fail deserialization instead of silently pricing
//! at zero.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Option Enums
// =============================================================================

/// Declares a style option with its wire names and surcharge in dollars.
/// The first variant listed is the no-op default.
macro_rules! style_option {
    (
        $(#[$meta:meta])*
        $name:ident {
            $default:ident = ($default_wire:literal, $default_fee:literal)
            $(, $variant:ident = ($wire:literal, $fee:literal))* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
        #[ts(export)]
        pub enum $name {
            #[default]
            #[serde(rename = $default_wire)]
            $default,
            $(
                #[serde(rename = $wire)]
                $variant,
            )*
        }

        impl $name {
            /// Surcharge for this choice.
            pub const fn surcharge(self) -> Money {
                match self {
                    $name::$default => Money::from_dollars($default_fee),
                    $($name::$variant => Money::from_dollars($fee),)*
                }
            }
        }
    };
}

style_option! {
    LapelStyle {
        Notched = ("notched", 0),
        Peak = ("peak", 25),
        Shawl = ("shawl", 35),
    }
}

style_option! {
    /// Jacket button count. The wire uses the digit.
    ButtonCount {
        Two = ("2", 0),
        One = ("1", 15),
        Three = ("3", 10),
    }
}

style_option! {
    VentStyle {
        Center = ("center", 0),
        None = ("none", 0),
        Side = ("side", 15),
        Double = ("double", 25),
    }
}

style_option! {
    PocketStyle {
        Flap = ("flap", 0),
        Besom = ("besom", 20),
        Patch = ("patch", 15),
    }
}

style_option! {
    LiningColor {
        Standard = ("standard", 0),
        Premium = ("premium", 30),
        Luxury = ("luxury", 50),
    }
}

style_option! {
    CuffStyle {
        Button = ("button", 0),
        French = ("french", 20),
        Barrel = ("barrel", 10),
    }
}

style_option! {
    FitType {
        Regular = ("regular", 0),
        Slim = ("slim", 0),
        Modern = ("modern", 15),
        Classic = ("classic", 25),
    }
}

// =============================================================================
// Monogram
// =============================================================================

const MONOGRAM_FEE: Money = Money::from_dollars(25);
const MONOGRAM_PREMIUM_FEE: Money = Money::from_dollars(45);

/// Embroidered initials. Blank text is treated as no monogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct Monogram {
    pub text: String,
    pub premium: bool,
}

impl Monogram {
    pub fn surcharge(&self) -> Money {
        if self.text.trim().is_empty() {
            Money::zero()
        } else if self.premium {
            MONOGRAM_PREMIUM_FEE
        } else {
            MONOGRAM_FEE
        }
    }
}

// =============================================================================
// Alterations
// =============================================================================

/// Measured adjustments, in signed quarter inches. Any non-zero value
/// incurs that alteration's flat fee regardless of magnitude or sign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct Alterations {
    pub sleeve: i32,
    pub waist: i32,
    pub length: i32,
    pub shoulder: i32,
    pub pant_waist: i32,
    pub pant_length: i32,
}

impl Alterations {
    pub fn surcharge(&self) -> Money {
        [
            (self.sleeve, 15),
            (self.waist, 20),
            (self.length, 25),
            (self.shoulder, 35),
            (self.pant_waist, 15),
            (self.pant_length, 20),
        ]
        .iter()
        .filter(|(adjustment, _)| *adjustment != 0)
        .map(|(_, dollars)| Money::from_dollars(*dollars))
        .sum()
    }
}

// =============================================================================
// Customization Record
// =============================================================================

const RUSH_FEE: Money = Money::from_dollars(30);

/// Tailoring options on one cart line. Every field defaults to its no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct Customization {
    pub lapel_style: LapelStyle,
    pub button_count: ButtonCount,
    pub vent_style: VentStyle,
    pub pocket_style: PocketStyle,
    pub lining_color: LiningColor,
    pub cuff_style: CuffStyle,
    pub fit_type: FitType,
    pub monogram: Option<Monogram>,
    pub alterations: Alterations,
    pub rush: bool,
    pub notes: String,
}

impl Customization {
    /// Total surcharge for this record. Non-negative.
    ///
    /// ```rust
    /// use storefront_core::customization::{Customization, Monogram};
    ///
    /// let c = Customization {
    ///     monogram: Some(Monogram { text: "AB".into(), premium: false }),
    ///     ..Default::default()
    /// };
    /// assert_eq!(c.surcharge().cents(), 2_500);
    /// ```
    pub fn surcharge(&self) -> Money {
        let mut total = self.lapel_style.surcharge()
            + self.button_count.surcharge()
            + self.vent_style.surcharge()
            + self.pocket_style.surcharge()
            + self.lining_color.surcharge()
            + self.cuff_style.surcharge()
            + self.fit_type.surcharge()
            + self.alterations.surcharge();

        if let Some(monogram) = &self.monogram {
            total += monogram.surcharge();
        }
        if self.rush {
            total += RUSH_FEE;
        }
        total
    }
}

/// Surcharge for an optional record; absent means zero.
pub fn resolve(customization: Option<&Customization>) -> Money {
    customization.map_or(Money::zero(), Customization::surcharge)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_default_cost_nothing() {
        assert_eq!(resolve(None), Money::zero());
        assert_eq!(resolve(Some(&Customization::default())), Money::zero());
    }

    #[test]
    fn test_notes_and_blank_monogram_are_free() {
        let c = Customization {
            notes: "slightly longer sleeves please".to_string(),
            monogram: Some(Monogram {
                text: "   ".to_string(),
                premium: true,
            }),
            vent_style: VentStyle::None,
            fit_type: FitType::Slim,
            ..Default::default()
        };
        assert_eq!(c.surcharge(), Money::zero());
    }

    #[test]
    fn test_style_surcharges_add_up() {
        let c = Customization {
            lapel_style: LapelStyle::Peak,
            button_count: ButtonCount::One,
            lining_color: LiningColor::Luxury,
            cuff_style: CuffStyle::French,
            ..Default::default()
        };
        // 25 + 15 + 50 + 20
        assert_eq!(c.surcharge(), Money::from_dollars(110));
    }

    #[test]
    fn test_monogram_premium() {
        let mut monogram = Monogram {
            text: "JD".to_string(),
            premium: false,
        };
        assert_eq!(monogram.surcharge(), Money::from_dollars(25));
        monogram.premium = true;
        assert_eq!(monogram.surcharge(), Money::from_dollars(45));
    }

    #[test]
    fn test_alterations_flat_fee_per_adjustment() {
        let alterations = Alterations {
            sleeve: -2,
            waist: 4,
            pant_length: 1,
            ..Default::default()
        };
        // 15 + 20 + 20, magnitude does not matter
        assert_eq!(alterations.surcharge(), Money::from_dollars(55));
    }

    #[test]
    fn test_rush() {
        let c = Customization {
            rush: true,
            ..Default::default()
        };
        assert_eq!(c.surcharge(), Money::from_dollars(30));
    }

    #[test]
    fn test_deserialize_partial_record() {
        let c: Customization =
            serde_json::from_str(r#"{"lapelStyle":"shawl","buttonCount":"3","rush":true}"#)
                .unwrap();
        assert_eq!(c.lapel_style, LapelStyle::Shawl);
        assert_eq!(c.button_count, ButtonCount::Three);
        assert_eq!(c.pocket_style, PocketStyle::Flap);
        assert_eq!(c.surcharge(), Money::from_dollars(35 + 10 + 30));
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let parsed = serde_json::from_str::<Customization>(r#"{"lapelStyle":"tuxedo"}"#);
        assert!(parsed.is_err());
    }
}
