//! Fixed reply texts sent to users.

pub fn welcome() -> String {
    "🎉 Welcome to In-House Bot!

I help creative entrepreneurs turn their Instagram profiles into professional product catalogs.

Simply send me your Instagram profile URL and I'll create a beautiful catalog of your products automatically!

Type \"start\" to begin or send me your Instagram URL directly."
        .to_string()
}

pub fn url_request() -> String {
    "📸 Please send me your Instagram profile URL

For example:
• https://instagram.com/yourbusiness
• https://www.instagram.com/yourbusiness

I'll analyze your posts and create a product catalog for you! ✨"
        .to_string()
}

pub fn processing(profile_url: &str) -> String {
    format!(
        "🔄 Processing your Instagram profile...

📍 Profile: {profile_url}

I'm analyzing your posts and extracting product information. This may take a few moments.

I'll send you the catalog once it's ready! ⏰"
    )
}

pub fn catalog_complete(business_name: &str, product_count: usize) -> String {
    format!(
        "✅ Your product catalog is ready!

🏪 Business: {business_name}
📦 Products found: {product_count}

Your Instagram posts have been converted into a professional product catalog. You can now use this for WhatsApp Business or e-commerce!

Would you like me to process another Instagram account? Just send me another URL! 🚀"
    )
}

pub fn unknown() -> String {
    "🤔 I didn't understand that.

Send me:
• \"hi\" or \"start\" to begin
• Your Instagram profile URL to create a catalog

How can I help you today?"
        .to_string()
}

pub fn already_processing() -> String {
    "⏳ I'm still working on your previous profile.

I'll message you as soon as that catalog is ready, then you can send another URL."
        .to_string()
}

/// Apology variants, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReply {
    InvalidUrl,
    ScrapingFailed,
    NoProducts,
    General,
}

impl ErrorReply {
    pub fn text(&self) -> String {
        match self {
            Self::InvalidUrl => "❌ Invalid Instagram URL

Please send a valid Instagram profile URL like:
• https://instagram.com/yourbusiness
• https://www.instagram.com/yourbusiness

Try again! 📸",
            Self::ScrapingFailed => "❌ Could not access Instagram profile

This might be because:
• The profile is private
• The URL is incorrect
• The profile doesn't exist

Please check the URL and try again! 🔄",
            Self::NoProducts => "📭 No products found

I couldn't find any product posts on this Instagram profile. Make sure:
• The profile has posts with products
• Posts include product descriptions
• The profile is public

Try with a different profile! 📸",
            Self::General => "❌ Something went wrong

Please try again or contact support if the issue persists.

Send \"start\" to begin again! 🔄",
        }
        .to_string()
    }
}
