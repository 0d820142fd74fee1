/// Numeric status code type used across the fabric layer.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const INVALID_PARAM: status_code_t = 2;
    pub const NO_MEMORY: status_code_t = 3;
    pub const NO_DEVICE: status_code_t = 4;
    pub const NO_RESOURCE: status_code_t = 5;
    pub const UNSUPPORTED: status_code_t = 6;
    pub const IO_ERROR: status_code_t = 7;
    pub const BUSY: status_code_t = 8;
    pub const UNKNOWN: status_code_t = 999;
}

/// Memory-domain operation status codes (1xxx).
pub mod MdCode {
    use super::status_code_t;

    pub const OPEN_FAILED: status_code_t = 1000;
    pub const QUERY_FAILED: status_code_t = 1001;
    pub const ALLOC_FAILED: status_code_t = 1002;
    pub const REG_FAILED: status_code_t = 1003;
    pub const DEREG_FAILED: status_code_t = 1004;
    pub const ADVISE_FAILED: status_code_t = 1005;
    pub const DETECT_FAILED: status_code_t = 1006;
}

/// Transport component status codes (2xxx).
pub mod TlCode {
    use super::status_code_t;

    pub const QUERY_FAILED: status_code_t = 2000;
    pub const IFACE_OPEN_FAILED: status_code_t = 2001;
    pub const DEVICE_UNAVAILABLE: status_code_t = 2002;
}

/// Config bundle status codes (3xxx).
pub mod ConfigCode {
    use super::status_code_t;

    pub const KEY_NOT_FOUND: status_code_t = 3000;
    pub const INVALID_TYPE: status_code_t = 3001;
    pub const INVALID_VALUE: status_code_t = 3002;
    pub const FILL_FAILED: status_code_t = 3003;
}

/// Remote-key protocol status codes (4xxx).
pub mod RkeyCode {
    use super::status_code_t;

    pub const COMPONENT_MISMATCH: status_code_t = 4000;
    pub const UNPACK_FAILED: status_code_t = 4001;
    pub const BUFFER_TOO_SHORT: status_code_t = 4002;
    pub const PTR_UNSUPPORTED: status_code_t = 4003;
}

/// Classification of status code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum StatusCodeType {
    Invalid = -1,
    Common = 0,
    Md = 1,
    Tl = 2,
    Config = 3,
    Rkey = 4,
}

/// Determine the type/category of a status code.
pub fn type_of(code: status_code_t) -> StatusCodeType {
    match code {
        0..=999 => StatusCodeType::Common,
        1000..=1999 => StatusCodeType::Md,
        2000..=2999 => StatusCodeType::Tl,
        3000..=3999 => StatusCodeType::Config,
        4000..=4999 => StatusCodeType::Rkey,
        _ => StatusCodeType::Invalid,
    }
}

/// Convert a status code to its human-readable name.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        // Common
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::INVALID_PARAM => "InvalidParam",
        StatusCode::NO_MEMORY => "NoMemory",
        StatusCode::NO_DEVICE => "NoDevice",
        StatusCode::NO_RESOURCE => "NoResource",
        StatusCode::UNSUPPORTED => "Unsupported",
        StatusCode::IO_ERROR => "IOError",
        StatusCode::BUSY => "Busy",
        StatusCode::UNKNOWN => "Unknown",

        // Md
        MdCode::OPEN_FAILED => "Md::OpenFailed",
        MdCode::QUERY_FAILED => "Md::QueryFailed",
        MdCode::ALLOC_FAILED => "Md::AllocFailed",
        MdCode::REG_FAILED => "Md::RegFailed",
        MdCode::DEREG_FAILED => "Md::DeregFailed",
        MdCode::ADVISE_FAILED => "Md::AdviseFailed",
        MdCode::DETECT_FAILED => "Md::DetectFailed",

        // Tl
        TlCode::QUERY_FAILED => "Tl::QueryFailed",
        TlCode::IFACE_OPEN_FAILED => "Tl::IfaceOpenFailed",
        TlCode::DEVICE_UNAVAILABLE => "Tl::DeviceUnavailable",

        // Config
        ConfigCode::KEY_NOT_FOUND => "Config::KeyNotFound",
        ConfigCode::INVALID_TYPE => "Config::InvalidType",
        ConfigCode::INVALID_VALUE => "Config::InvalidValue",
        ConfigCode::FILL_FAILED => "Config::FillFailed",

        // Rkey
        RkeyCode::COMPONENT_MISMATCH => "Rkey::ComponentMismatch",
        RkeyCode::UNPACK_FAILED => "Rkey::UnpackFailed",
        RkeyCode::BUFFER_TOO_SHORT => "Rkey::BufferTooShort",
        RkeyCode::PTR_UNSUPPORTED => "Rkey::PtrUnsupported",

        _ => "UnknownStatusCode",
    }
}

/// Convert a status code to the corresponding POSIX errno value.
pub fn to_errno(code: status_code_t) -> i32 {
    match code {
        StatusCode::OK => 0,
        StatusCode::NOT_IMPLEMENTED => libc::ENOSYS,
        StatusCode::INVALID_PARAM => libc::EINVAL,
        StatusCode::NO_MEMORY => libc::ENOMEM,
        StatusCode::NO_DEVICE => libc::ENODEV,
        StatusCode::NO_RESOURCE => libc::EAGAIN,
        StatusCode::UNSUPPORTED => libc::EOPNOTSUPP,
        StatusCode::BUSY => libc::EBUSY,

        ConfigCode::KEY_NOT_FOUND => libc::ENOENT,
        ConfigCode::INVALID_TYPE | ConfigCode::INVALID_VALUE => libc::EINVAL,

        RkeyCode::COMPONENT_MISMATCH | RkeyCode::BUFFER_TOO_SHORT => libc::EINVAL,
        RkeyCode::PTR_UNSUPPORTED => libc::EOPNOTSUPP,

        c if type_of(c) == StatusCodeType::Tl => libc::ENODEV,

        _ => libc::EIO,
    }
}
