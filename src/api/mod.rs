pub mod agent_dto;
pub mod desired_dto;
pub mod status_dto;
