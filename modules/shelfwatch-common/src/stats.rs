use chrono::{DateTime, Utc};

use crate::types::{RatingDistribution, ReviewSummary, StoredReview};

/// Aggregates computed from one review scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewStats {
    pub total: usize,
    pub verified: usize,
    pub amazon_vine: usize,
    pub mean_rating: f64,
    /// Fraction of reviews at each star level. All zero when `total == 0`.
    pub distribution: RatingDistribution,
}

impl ReviewStats {
    pub fn compute(reviews: &[StoredReview]) -> Self {
        let total = reviews.len();
        let mut counts = [0usize; 5];
        let mut rating_sum = 0.0;
        let mut verified = 0;
        let mut amazon_vine = 0;

        for review in reviews {
            counts[star_bucket(review.rating_score) - 1] += 1;
            rating_sum += review.rating_score;
            if review.is_verified {
                verified += 1;
            }
            if review.is_amazon_vine {
                amazon_vine += 1;
            }
        }

        let share = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        Self {
            total,
            verified,
            amazon_vine,
            mean_rating: if total == 0 { 0.0 } else { rating_sum / total as f64 },
            distribution: RatingDistribution {
                one: share(counts[0]),
                two: share(counts[1]),
                three: share(counts[2]),
                four: share(counts[3]),
                five: share(counts[4]),
            },
        }
    }

    /// Summary as stored on the product. The mean is rounded to one decimal.
    pub fn summary(&self, now: DateTime<Utc>) -> ReviewSummary {
        ReviewSummary {
            rating: (self.mean_rating * 10.0).round() / 10.0,
            review_count: self.total as i64,
            stars_breakdown: self.distribution.clone(),
            verified_purchases: self.verified as i64,
            amazon_vine_reviews: self.amazon_vine as i64,
            last_updated: now,
        }
    }
}

/// Star level (1..=5) a rating counts towards. Fractional ratings round to
/// the nearest star; missing or out-of-range scores are clamped so every
/// review lands in exactly one bucket.
pub fn star_bucket(rating: f64) -> usize {
    if rating.is_nan() {
        return 1;
    }
    (rating.round() as i64).clamp(1, 5) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: f64, verified: bool) -> StoredReview {
        StoredReview {
            id: uuid::Uuid::new_v4().to_string(),
            review_id: None,
            review_title: String::new(),
            review_description: String::new(),
            rating_score: rating,
            reviewed_in: None,
            is_verified: verified,
            author: "Anonymous".to_string(),
            user_id: None,
            user_profile_link: None,
            review_url: None,
            review_reaction: None,
            is_amazon_vine: false,
            variant: None,
            variant_attributes: None,
            review_images: Vec::new(),
            position: None,
        }
    }

    #[test]
    fn empty_set_is_all_zero() {
        let stats = ReviewStats::compute(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.mean_rating, 0.0);
        assert_eq!(stats.distribution, RatingDistribution::default());
    }

    #[test]
    fn fractions_sum_to_one() {
        let reviews = vec![
            review(5.0, true),
            review(5.0, false),
            review(4.0, true),
            review(1.0, false),
            review(2.6, false),
            review(0.0, false),
            review(7.0, true),
        ];
        let stats = ReviewStats::compute(&reviews);
        assert!((stats.distribution.total() - 1.0).abs() < 1e-9);
        assert_eq!(stats.verified, 3);
        assert!((stats.distribution.five - 3.0 / 7.0).abs() < 1e-9);
        assert!((stats.distribution.one - 2.0 / 7.0).abs() < 1e-9);
        assert!((stats.distribution.three - 1.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn summary_rounds_mean_to_one_decimal() {
        let reviews = vec![review(5.0, true), review(4.0, true), review(4.0, false)];
        let summary = ReviewStats::compute(&reviews).summary(Utc::now());
        assert_eq!(summary.rating, 4.3);
        assert_eq!(summary.review_count, 3);
        assert_eq!(summary.verified_purchases, 2);
    }

    #[test]
    fn buckets_clamp_out_of_range() {
        assert_eq!(star_bucket(0.0), 1);
        assert_eq!(star_bucket(4.49), 4);
        assert_eq!(star_bucket(4.5), 5);
        assert_eq!(star_bucket(12.0), 5);
        assert_eq!(star_bucket(f64::NAN), 1);
    }
}
