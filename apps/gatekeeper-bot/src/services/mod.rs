pub mod approval_service;
