use amend_core::{
  LearningConfig,
  condition::{AmountBand, Condition, MerchantName, significant_tokens},
  correction::{CorrectedField, EntityType},
  pattern::{Adjustment, Pattern, PatternKey, PatternType},
  suggest::confidence,
};
use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

fn fresh_pattern(config: &LearningConfig) -> Pattern {
  let key = PatternKey::new(
    EntityType::Expense,
    PatternType::MerchantCategory,
    Condition::Merchant(MerchantName::new("Starbucks").unwrap()),
  )
  .unwrap();
  Pattern::candidate(
    Uuid::new_v4(),
    key,
    Adjustment::new(CorrectedField::Category, "Meals").unwrap(),
    config,
    Utc::now(),
  )
}

proptest! {
    #[test]
    fn accuracy_stays_in_unit_interval(observations in prop::collection::vec(any::<bool>(), 0..200)) {
        let config = LearningConfig::default();
        let mut pattern = fresh_pattern(&config);
        for agrees in observations {
            let value = if agrees { "Meals" } else { "Office Supplies" };
            pattern.observe(value, &config, Utc::now());
            prop_assert!((0.0..=1.0).contains(&pattern.accuracy));
        }
    }

    #[test]
    fn occurrences_never_decrease(observations in prop::collection::vec(any::<bool>(), 0..200)) {
        let config = LearningConfig::default();
        let mut pattern = fresh_pattern(&config);
        let mut previous = pattern.occurrences;
        for agrees in observations {
            pattern.observe(if agrees { "meals" } else { "travel" }, &config, Utc::now());
            prop_assert!(pattern.occurrences > previous);
            prop_assert_eq!(pattern.occurrences, pattern.positive + pattern.negative);
            previous = pattern.occurrences;
        }
    }

    #[test]
    fn observing_never_demotes(observations in prop::collection::vec(any::<bool>(), 0..200)) {
        let config = LearningConfig::default();
        let mut pattern = fresh_pattern(&config);
        let mut was_active = false;
        for agrees in observations {
            pattern.observe(if agrees { "Meals" } else { "Rent" }, &config, Utc::now());
            if was_active {
                prop_assert!(pattern.active);
            }
            was_active = pattern.active;
        }
    }

    #[test]
    fn active_implies_enough_occurrences(observations in prop::collection::vec(any::<bool>(), 0..50)) {
        let config = LearningConfig::default();
        let mut pattern = fresh_pattern(&config);
        for agrees in observations {
            pattern.observe(if agrees { "Meals" } else { "Rent" }, &config, Utc::now());
            if pattern.active {
                prop_assert!(pattern.occurrences >= config.min_occurrences);
            }
        }
    }

    #[test]
    fn confidence_is_bounded(accuracy in 0.0f64..=1.0, occurrences in 0u32..100_000) {
        let c = confidence(accuracy, occurrences);
        prop_assert!((0.0..=1.0).contains(&c));
        prop_assert!(c >= accuracy - 1e-12);
    }

    #[test]
    fn finite_amounts_always_land_in_a_containing_band(amount in -1.0e9f64..1.0e9) {
        let band = AmountBand::for_amount(amount).unwrap();
        prop_assert!(band.contains(amount));
        let (lo, hi) = band.bounds();
        prop_assert!(amount.abs() >= lo);
        if let Some(hi) = hi {
            prop_assert!(amount.abs() < hi);
        }
    }

    #[test]
    fn keyword_extraction_respects_limit(text in ".{0,300}", limit in 1usize..10) {
        let tokens = significant_tokens(&text, limit);
        prop_assert!(tokens.len() <= limit);
        for t in &tokens {
            prop_assert!(t.as_str().chars().count() >= 3);
        }
    }
}
