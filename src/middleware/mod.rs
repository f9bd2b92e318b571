pub mod request_id;
pub mod visitor;

pub use request_id::{make_span_with_request_id, request_id_middleware, RequestId};
pub use visitor::{
    read_cookie, set_cookie, visitor_cookie, Visitor, USER_ID_HEADER, VISITOR_COOKIE,
};
