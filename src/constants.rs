#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Line prefix carrying the points a grader awarded.
pub const TOTAL_POINTS_PREFIX: &str = "TotalPoints: ";

/// Line prefix carrying the points a grader could have awarded.
pub const MAX_POINTS_PREFIX: &str = "MaxPoints: ";

/// Exact line separating primary output from the appendix.
pub const APPENDIX_DELIMITER: &str = "***APPENDIX***";

/// Marker opening a new diff test case record.
pub const TESTCASE_MARKER: &str = "Testcase:";

/// Marker opening the expected-output section of a diff test case.
pub const EXPECTED_MARKER: &str = "Expected:";

/// Marker opening the actual-output section of a diff test case.
pub const ACTUAL_MARKER: &str = "Actual:";

/// Submission key holding the sample manifest nonce.
pub const NONCE_KEY: &str = "_nonce";

/// Submission key holding the encoded sample.
pub const SAMPLE_KEY: &str = "_sample";

/// Submission key holding the sample checksum.
pub const CHECKSUM_KEY: &str = "_checksum";

/// Length of a freshly generated manifest nonce.
pub const NONCE_LENGTH: usize = 16;

/// Separator between per-group tokens of an encoded sample.
pub const SAMPLE_GROUP_SEPARATOR: char = '/';

/// Separator between field indices inside one sample token.
pub const SAMPLE_INDEX_SEPARATOR: char = '-';

/// Module prefix action type names may carry, e.g. `grader.actions.sandbox`.
pub const ACTION_TYPE_PREFIX: &str = "grader.actions.";

/// Exit code reported for invocations that ran past their deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Path of the repository source file inside a submission directory.
pub const GITSOURCE_PATH: &str = "user/gitsource";
