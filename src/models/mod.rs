mod catalog;
mod gun;
mod payment;
mod user;

pub use catalog::{
    Caliber, CreateCaliber, CreateManufacturer, CreateWeaponType, Manufacturer, WeaponType,
};
pub use gun::{CreateGun, Gun, GunWithRefs};
pub use payment::{CreatePayment, Payment, PaymentStatus};
pub use user::{validate_email_format, CreateUser, User};
