//! Input rewriting, output extraction, and batch queue submission for
//! electronic-structure programs

pub mod input;
pub mod program;
pub mod queue;

/// time the duration of `$body` and store the resulting Duration in `$elapsed`
#[macro_export]
macro_rules! time {
    ($elapsed:ident, $body:block) => {
        let now = std::time::Instant::now();
        $body;
        let $elapsed = now.elapsed();
    };
}
