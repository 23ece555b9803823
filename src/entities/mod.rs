pub mod affiliate;
pub mod affiliate_referral;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;

// Re-export entities
pub use affiliate::{Entity as Affiliate, Model as AffiliateModel};
pub use affiliate_referral::{
    Entity as AffiliateReferral, Model as AffiliateReferralModel, ReferralStatus,
};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use order::{Address, Entity as Order, Model as OrderModel, OrderStatus, PaymentMethod};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Gender, Model as ProductModel};
pub use user::{Entity as User, Model as UserModel};
