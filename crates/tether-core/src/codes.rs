//! Error codes shared by every service speaking the envelope protocol.
//!
//! Codes below 1000 belong to the protocol layer (dispatcher and invoker).
//! Codes from 1000 up are raised by business logic and pass through
//! untouched. All peers must agree on this numbering.

/// Payload could not be decoded as JSON.
pub const REQUEST_DATA: i64 = 100;
/// Write verb sent without the canonical JSON content type.
pub const CONTENT_TYPE: i64 = 101;
/// Token missing, unknown, or expired.
pub const AUTHORIZATION: i64 = 102;

/// Peer answered with a status other than 200 or 401.
pub const PEER_STATUS: i64 = 201;
/// Peer answered with a non-JSON content type.
pub const PEER_CONTENT_TYPE: i64 = 202;
/// Peer could not be reached after every attempt.
pub const PEER_UNREACHABLE: i64 = 203;
/// Shared-secret key present but not valid.
pub const INTERNAL_KEY: i64 = 206;
/// Operation failed with an unhandled fault.
pub const CRASHED: i64 = 207;
/// Operation read a payload that was never sent.
pub const NO_DATA: i64 = 208;
/// Operation read a session that was never attached.
pub const NO_SESSION: i64 = 209;

pub const RIGHTS: i64 = 1000;
pub const BODY_FIELD: i64 = 1001;

pub const DB_NO_RECORD: i64 = 1100;
pub const DB_DUPLICATE: i64 = 1101;
pub const DB_CREATE_FAILED: i64 = 1102;
pub const DB_DELETE_FAILED: i64 = 1103;
pub const DB_UPDATE_FAILED: i64 = 1104;
pub const DB_KEY_BEING_USED: i64 = 1105;
pub const DB_ARCHIVED: i64 = 1106;

pub const PASSWORD_STRENGTH: i64 = 1200;

/// First code available to application logic.
pub const APPLICATION_BASE: i64 = 1000;

/// True when `code` is owned by the protocol layer rather than a service.
pub fn is_protocol(code: i64) -> bool {
    (1..APPLICATION_BASE).contains(&code)
}

/// Right bitmasks checked against a named permission.
pub mod rights {
    pub const READ: u8 = 0x01;
    pub const UPDATE: u8 = 0x02;
    pub const CREATE: u8 = 0x04;
    pub const DELETE: u8 = 0x08;
    pub const ALL: u8 = 0x0F;

    pub const CREATE_UPDATE_DELETE: u8 = 0x0E;
    pub const CREATE_READ_DELETE: u8 = 0x0D;
    pub const READ_UPDATE: u8 = 0x03;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_and_application_ranges_do_not_overlap() {
        let protocol = [
            REQUEST_DATA, CONTENT_TYPE, AUTHORIZATION, PEER_STATUS, PEER_CONTENT_TYPE,
            PEER_UNREACHABLE, INTERNAL_KEY, CRASHED, NO_DATA, NO_SESSION,
        ];
        let application = [
            RIGHTS, BODY_FIELD, DB_NO_RECORD, DB_DUPLICATE, DB_CREATE_FAILED,
            DB_DELETE_FAILED, DB_UPDATE_FAILED, DB_KEY_BEING_USED, DB_ARCHIVED,
            PASSWORD_STRENGTH,
        ];
        assert!(protocol.iter().all(|c| is_protocol(*c)));
        assert!(application.iter().all(|c| !is_protocol(*c)));
    }

    #[test]
    fn composite_rights_are_unions() {
        assert_eq!(rights::ALL, rights::READ | rights::UPDATE | rights::CREATE | rights::DELETE);
        assert_eq!(rights::CREATE_UPDATE_DELETE, rights::CREATE | rights::UPDATE | rights::DELETE);
        assert_eq!(rights::CREATE_READ_DELETE, rights::CREATE | rights::READ | rights::DELETE);
        assert_eq!(rights::READ_UPDATE, rights::READ | rights::UPDATE);
    }
}
