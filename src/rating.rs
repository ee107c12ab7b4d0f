use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, sea_query::Expr,
};

use crate::entities::{review, title};

/// Mean of `scores` rounded to one decimal place, ties to even, `None` when
/// empty.
pub fn average_score(scores: &[i32]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let sum: i64 = scores.iter().map(|&s| i64::from(s)).sum();
    let mean = sum as f64 / scores.len() as f64;
    Some((mean * 10.0).round_ties_even() / 10.0)
}

/// Recomputes and stores the rating of `title_id` from its current reviews.
///
/// Called with the transaction that wrote the review so the stored rating never
/// lags behind the reviews table.
pub async fn refresh_rating<C: ConnectionTrait>(
    conn: &C,
    title_id: i32,
) -> Result<Option<f64>, DbErr> {
    let scores: Vec<i32> = review::Entity::find()
        .filter(review::Column::TitleId.eq(title_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.score)
        .collect();

    let rating = average_score(&scores);

    title::Entity::update_many()
        .col_expr(title::Column::Rating, Expr::value(rating))
        .filter(title::Column::Id.eq(title_id))
        .exec(conn)
        .await?;

    tracing::debug!(title_id = title_id, reviews = scores.len(), rating = ?rating, "refreshed rating");

    Ok(rating)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_reviews_means_no_rating() {
        assert_eq!(average_score(&[]), None);
    }

    #[test]
    fn mean_is_rounded_to_one_decimal() {
        assert_eq!(average_score(&[10]), Some(10.0));
        assert_eq!(average_score(&[7, 8]), Some(7.5));
        assert_eq!(average_score(&[1, 2, 2]), Some(1.7));
        assert_eq!(average_score(&[10, 9, 9]), Some(9.3));
    }

    #[test]
    fn exact_halves_round_to_even() {
        assert_eq!(average_score(&[1, 1, 1, 2]), Some(1.2));
        assert_eq!(average_score(&[3, 3, 3, 4]), Some(3.2));
        assert_eq!(average_score(&[1, 1, 2, 2, 2, 2, 2, 2]), Some(1.8));
    }

    #[test]
    fn rating_stays_within_score_bounds() {
        let scores: Vec<i32> = (1..=10).cycle().take(97).collect();
        let rating = average_score(&scores).unwrap();
        assert!((1.0..=10.0).contains(&rating));
    }
}
