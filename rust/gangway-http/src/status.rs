//! The status-code whitelist.
//!
//! Only statuses in this table may be forwarded to the host; everything else
//! fails the call. The table is the union of the schema-declared success and
//! client-error codes with the fixed no-content, redirect and
//! precondition-failed mappings.

use std::collections::HashMap;
use std::sync::LazyLock;

use gangway_types::{ClientErrorCode, SuccessCode};

/// Classification of a whitelisted status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Content(SuccessCode),
    NoContent { should_reset_form: bool },
    Redirect { is_permanent: bool, switch_to_get: bool },
    PreconditionFailed,
    ClientError(ClientErrorCode),
}

static STATUS_TABLE: LazyLock<HashMap<u16, StatusClass>> = LazyLock::new(|| {
    let mut table = HashMap::new();

    for code in SuccessCode::ALL {
        table.insert(code.http_status(), StatusClass::Content(code));
    }
    for code in ClientErrorCode::ALL {
        table.insert(code.http_status(), StatusClass::ClientError(code));
    }

    table.insert(204, StatusClass::NoContent { should_reset_form: false });
    table.insert(205, StatusClass::NoContent { should_reset_form: true });

    table.insert(301, StatusClass::Redirect { is_permanent: true, switch_to_get: true });
    table.insert(302, StatusClass::Redirect { is_permanent: false, switch_to_get: true });
    table.insert(303, StatusClass::Redirect { is_permanent: false, switch_to_get: true });
    table.insert(307, StatusClass::Redirect { is_permanent: false, switch_to_get: false });
    table.insert(308, StatusClass::Redirect { is_permanent: true, switch_to_get: false });

    table.insert(304, StatusClass::PreconditionFailed);
    table.insert(412, StatusClass::PreconditionFailed);

    table
});

/// Classify a status code, or `None` when it is not whitelisted.
///
/// Pure and total over the whitelist; the 4xx/5xx degradation fallbacks are
/// the response builder's business, not the table's.
pub fn classify(code: u16) -> Option<StatusClass> {
    STATUS_TABLE.get(&code).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_codes_map_to_content() {
        assert_eq!(classify(200), Some(StatusClass::Content(SuccessCode::Ok)));
        assert_eq!(classify(201), Some(StatusClass::Content(SuccessCode::Created)));
        assert_eq!(classify(202), Some(StatusClass::Content(SuccessCode::Accepted)));
        assert_eq!(classify(207), Some(StatusClass::Content(SuccessCode::MultiStatus)));
    }

    #[test]
    fn no_content_resets_form_only_for_205() {
        assert_eq!(classify(204), Some(StatusClass::NoContent { should_reset_form: false }));
        assert_eq!(classify(205), Some(StatusClass::NoContent { should_reset_form: true }));
    }

    #[test]
    fn redirect_matrix() {
        assert_eq!(
            classify(301),
            Some(StatusClass::Redirect { is_permanent: true, switch_to_get: true })
        );
        assert_eq!(
            classify(302),
            Some(StatusClass::Redirect { is_permanent: false, switch_to_get: true })
        );
        assert_eq!(
            classify(303),
            Some(StatusClass::Redirect { is_permanent: false, switch_to_get: true })
        );
        assert_eq!(
            classify(307),
            Some(StatusClass::Redirect { is_permanent: false, switch_to_get: false })
        );
        assert_eq!(
            classify(308),
            Some(StatusClass::Redirect { is_permanent: true, switch_to_get: false })
        );
    }

    #[test]
    fn preconditions_and_client_errors() {
        assert_eq!(classify(304), Some(StatusClass::PreconditionFailed));
        assert_eq!(classify(412), Some(StatusClass::PreconditionFailed));
        assert_eq!(
            classify(404),
            Some(StatusClass::ClientError(ClientErrorCode::NotFound))
        );
        assert_eq!(
            classify(418),
            Some(StatusClass::ClientError(ClientErrorCode::ImATeapot))
        );
    }

    #[test]
    fn everything_else_is_unlisted() {
        for code in [100, 101, 203, 206, 300, 305, 306, 401, 402, 407, 500, 502, 503] {
            assert_eq!(classify(code), None, "status {code} must not be whitelisted");
        }
    }
}
