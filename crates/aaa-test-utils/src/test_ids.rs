//! Fixed test identifiers
//!
//! All test IDs are deterministic to keep test output reproducible.

// Subjects
pub const TEST_SUBJECT_ALICE: &str = "user-alice";
pub const TEST_SUBJECT_BOB: &str = "user-bob";

// Tenants
pub const TEST_TENANT_ACME: &str = "acme";
pub const TEST_TENANT_GLOBEX: &str = "globex";

// Relying-party client IDs (also the audiences the mock issuer mints for)
pub const TEST_CLIENT_ID: &str = "portal";
pub const TEST_OTHER_CLIENT_ID: &str = "billing";

pub const TEST_REDIRECT_URL: &str = "https://app.example.com/callback";

// Test scopes
pub const SCOPE_OPENID: &str = "openid";
pub const SCOPE_MEETINGS_READ: &str = "meetings:read";
pub const SCOPE_MEETINGS_WRITE: &str = "meetings:write";
pub const SCOPE_ADMIN_SERVICES: &str = "admin:services";

// KillKrill
pub const TEST_KILLKRILL_API_KEY: &str = "kk-test-key-do-not-use-in-production";
