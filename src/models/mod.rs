pub mod account;
pub mod building;
pub mod checklist;
pub mod message;
pub mod organization;
pub mod photo;
pub mod work_request;

pub use account::{Account, AccountPublic, AccountRole, AuthResponse, LoginRequest,
    RefreshTokenRequest, TokenResponse};
pub use building::{Building, CreateBuildingRequest, UpdateBuildingRequest};
pub use checklist::{AddChecklistItemRequest, ChecklistItem};
pub use message::{Message, MessageResponse, SendMessageRequest, SenderType};
pub use organization::{CreateManagerRequest, ManagerResponse, Organization, UpdateManagerRequest};
pub use photo::{Document, DocumentType, Photo, PhotoType, PhotoUploadResponse};
pub use work_request::{
    CategoryCount, CreateWorkRequestPayload, MonthCount, RequestPriority, RequestReport,
    RequestStats, RequestStatus, StatusHistoryEntry, TransitionPayload, UpdateWorkRequestPayload,
    WorkRequest, WorkRequestDetail, WorkRequestWithRelations,
};
