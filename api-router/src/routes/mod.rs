pub mod company_profile;
pub mod documents;
pub mod liveness;
pub mod readiness;
pub mod sessions;
pub mod talk_points;
