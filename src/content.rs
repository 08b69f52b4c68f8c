//! Post content generation.
//!
//! Title templates may carry two dynamic tokens: `[HH:MM]` (current local
//! wall-clock time) and `[RND3]` (a random integer in 100..=999). One time
//! value and one random draw are produced per call and substituted everywhere
//! each token appears. Descriptions are passed through untouched.

use chrono::Local;

pub const TOKEN_TIME: &str = "[HH:MM]";
pub const TOKEN_RND3: &str = "[RND3]";

/// Pure substitution core; the clock and the draw are supplied by the caller.
pub fn render_title(template: &str, hhmm: &str, rnd: u32) -> String {
    template
        .replace(TOKEN_TIME, hhmm)
        .replace(TOKEN_RND3, &rnd.to_string())
}

/// Expand a title/description template pair at materialization time.
pub fn generate(title_template: &str, description_template: &str) -> (String, String) {
    let hhmm = Local::now().format("%H:%M").to_string();
    let rnd = fastrand::u32(100..=999);
    (
        render_title(title_template, &hhmm, rnd),
        description_template.to_string(),
    )
}
