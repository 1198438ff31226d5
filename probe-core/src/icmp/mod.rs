pub mod echo;

pub use echo::{
    IcmpEcho, IcmpError, DESTINATION_UNREACHABLE_TYPE, ECHO_REPLY_TYPE, ECHO_REQUEST_TYPE,
    PARAMETER_PROBLEM_TYPE, REDIRECT_TYPE, TIME_EXCEEDED_TYPE,
};
