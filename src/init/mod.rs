// Boot phase initialization

pub mod boot;
