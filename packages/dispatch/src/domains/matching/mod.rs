//! Matching domain - picks which helper a booking is offered to.

pub mod utils;

pub use utils::scoring::{
    is_eligible, is_free, score, select, select_best, Candidate, MatchRequest, Selection,
    RATING_BONUS_MAX,
};
