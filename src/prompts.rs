//! Outgoing message text.
//!
//! Everything here is Telegram-flavoured HTML. Values coming from users or
//! the backend go through [`escape`] before they are interpolated.

use crate::dispatcher::{Action, OutgoingContent};
use crate::error::{GatewayError, ValidationError};
use crate::gateway::fields::{self, Object};
use crate::gateway::{CreditBalances, ScanHistoryEntry, ScanRecord, UserProfile};
use crate::session::Tier;

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// `first8...last8` for long addresses.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 16 {
        return address.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{head}...{tail}")
}

// ── Menus ───────────────────────────────────────────────────────────

pub fn main_menu() -> Vec<Action> {
    vec![
        Action::new("🔍 Scan", "scan"),
        Action::new("📊 Dashboard", "dashboard"),
        Action::new("💰 Balance", "balance"),
        Action::new("📜 History", "history"),
        Action::new("💎 Upgrade", "upgrade"),
        Action::new("❓ Help", "show_help"),
    ]
}

pub fn tier_menu() -> Vec<Action> {
    vec![
        Action::new("💚 FREE (Basic)", "scan_tier:free"),
        Action::new("⭐ PREMIUM (Advanced)", "scan_tier:premium"),
        Action::new("🚀 MVP (Unlimited)", "scan_tier:mvp"),
        Action::new("❌ Cancel", "cancel"),
    ]
}

pub fn cancel_menu() -> Vec<Action> {
    vec![Action::new("❌ Cancel", "cancel")]
}

fn with_cancel(text: impl Into<String>) -> OutgoingContent {
    OutgoingContent::text(text).with_actions(cancel_menu())
}

// ── Informational ───────────────────────────────────────────────────

const WELCOME: &str = "\
🛡️ <b>Welcome to SPL Shield!</b>

I am your Solana risk co-pilot. Run instant token and wallet scans, get AI \
recommendations, and stay on top of on-chain threats.

<b>🎯 Service Tiers:</b>
💚 <b>Free</b> – 5 scans/day with essential checks
⭐ <b>Premium</b> – Enhanced liquidity and holder analytics (10 TDL per scan)
🚀 <b>MVP</b> – Full AI suite with MEV, rugpull and sentiment analysis (50 TDL per scan)

<b>⚡ Quick Start:</b>
1. /register and verify your email
2. /login to link your account
3. /scan any token or wallet address

Tap the buttons below or type /help for the full command list.";

const HELP: &str = "\
📚 <b>SPL Shield • Command Guide</b>

<b>👤 User Commands</b>
/start – Welcome message and menu
/help – Display this guide
/register – Create a new account
/login – Sign in after email verification
/logout – Disconnect the bot
/dashboard – Account overview and credits
/scan – Analyze a token or wallet
/history – Show recent scans
/balance – View TDL and credit balances
/upgrade – Tier benefits
/cancel – Abort the current step

<b>💳 Payment Commands</b>
/buy_credits – Purchase instructions
/pricing – Tier and credit pricing
/verify_payment &lt;tx&gt; [premium|mvp] – Confirm a TDL purchase

<b>🛠️ Admin Commands</b>
/admin – High level dashboard
/stats – Usage breakdown
/users – Recent users snapshot
/transactions – Payment activity

💡 Risk scores run from 0 to 1; higher is riskier.";

const PRICING: &str = "\
💎 <b>SPL Shield Pricing</b>

<b>Scan Tiers</b>
💚 Free – 5 scans/day, core risk checks
⭐ Premium – Advanced liquidity and holder analytics (10 TDL per scan)
🚀 MVP – Full AI insights, MEV and rugpull detection (50 TDL per scan)

<b>How to Pay</b>
1. Send TDL to the treasury wallet shown in the web dashboard
2. Use <code>/verify_payment &lt;tx_signature&gt; [premium|mvp]</code>
3. Start scanning with the desired tier

Free credits reset daily. Premium and MVP credits never expire.";

const UPGRADE: &str = "\
⬆️ <b>Upgrade Your Tier</b>

⭐ <b>PREMIUM</b>
• 50 scans per day
• Advanced AI insights
• Priority support

🚀 <b>MVP</b>
• Unlimited scans
• Real-time monitoring
• API access

To upgrade, buy credits with /buy_credits and confirm with /verify_payment.";

const BUY_CREDITS: &str = "\
💳 <b>Purchase Credits</b>

<b>Available Packages:</b>
• 10 Credits = 10 TDL
• 50 Credits = 45 TDL (10% off)
• 100 Credits = 80 TDL (20% off)

Send TDL to the treasury wallet shown in the web dashboard, then run
<code>/verify_payment &lt;tx_signature&gt; [premium|mvp]</code>.";

pub fn welcome() -> OutgoingContent {
    OutgoingContent::text(WELCOME).with_actions(main_menu())
}

pub fn help() -> OutgoingContent {
    OutgoingContent::text(HELP).with_actions(main_menu())
}

pub fn pricing() -> OutgoingContent {
    OutgoingContent::text(PRICING)
}

pub fn upgrade() -> OutgoingContent {
    OutgoingContent::text(UPGRADE)
}

pub fn buy_credits() -> OutgoingContent {
    OutgoingContent::text(BUY_CREDITS)
}

pub fn unknown_command(name: &str) -> OutgoingContent {
    OutgoingContent::text(format!(
        "🤔 Unknown command /{}. Type /help to see what I can do.",
        escape(name)
    ))
}

pub fn idle_hint() -> OutgoingContent {
    OutgoingContent::text("Pick an action below or type /help.").with_actions(main_menu())
}

// ── Conversation control ────────────────────────────────────────────

pub fn cancelled() -> OutgoingContent {
    OutgoingContent::text("❌ Operation cancelled.").with_actions(main_menu())
}

/// Replaces the processing notice of a request that was cancelled.
pub fn request_withdrawn() -> OutgoingContent {
    OutgoingContent::text("❌ Request cancelled.")
}

pub fn still_working() -> OutgoingContent {
    OutgoingContent::text("⏳ Still working on your last request. Please wait, or /cancel.")
}

pub fn not_logged_in() -> OutgoingContent {
    OutgoingContent::text("❌ Please login first with /login")
}

pub fn admins_only() -> OutgoingContent {
    OutgoingContent::text("❌ This command is for admins only.")
}

pub fn invalid_input(error: ValidationError, hint: &str) -> OutgoingContent {
    with_cancel(format!("❌ {error}.\n\n{hint}"))
}

// ── Registration ────────────────────────────────────────────────────

pub const ASK_EMAIL: &str = "Please enter your email address.\nExample: user@example.com";
pub const ASK_PASSWORD: &str = "Please choose a password (at least 6 characters).";
pub const ASK_CONFIRM_PASSWORD: &str = "Please enter the password again to confirm.";
pub const ASK_USERNAME: &str = "Finally, choose a username (at least 3 characters).";

pub fn register_prompt() -> OutgoingContent {
    with_cancel(format!(
        "📝 <b>Account Registration</b>\n\n{ASK_EMAIL}\n\nType /cancel to abort registration."
    ))
}

pub fn ask_password() -> OutgoingContent {
    with_cancel(format!("✅ Email saved.\n\n{ASK_PASSWORD}"))
}

pub fn ask_confirm_password() -> OutgoingContent {
    with_cancel(ASK_CONFIRM_PASSWORD)
}

pub fn ask_username() -> OutgoingContent {
    with_cancel(format!("✅ Password confirmed.\n\n{ASK_USERNAME}"))
}

pub fn password_mismatch() -> OutgoingContent {
    with_cancel(format!(
        "❌ {}. Let's start the password again.\n\n{ASK_PASSWORD}",
        ValidationError::PasswordMismatch
    ))
}

pub fn registration_success(username: &str, email: &str, message: &str) -> OutgoingContent {
    OutgoingContent::text(format!(
        "✅ <b>Registration Submitted!</b>\n\n\
         Welcome aboard, {}!\n\
         {}\n\n\
         We sent a verification email to <b>{}</b>.\n\n\
         <b>Next Steps:</b>\n\
         1. Open the email and click the verification link\n\
         2. Return here and use /login\n\
         3. Start scanning with /scan",
        escape(username),
        escape(message),
        escape(email),
    ))
}

pub fn registration_retry(error: &GatewayError) -> OutgoingContent {
    with_cancel(format!(
        "❌ Registration failed: {}\n\nEnter a different username to retry, or /cancel.",
        escape(&error.to_string())
    ))
}

// ── Login ───────────────────────────────────────────────────────────

pub fn login_prompt() -> OutgoingContent {
    with_cancel(
        "🔐 <b>Account Login</b>\n\nPlease enter your email address.\n\n\
         Type /cancel to abort login.",
    )
}

pub fn ask_login_password() -> OutgoingContent {
    with_cancel("Please enter your password.")
}

pub fn login_success(user: &UserProfile) -> OutgoingContent {
    let credits = &user.credits;
    OutgoingContent::text(format!(
        "✅ <b>Login Successful!</b>\n\n\
         Welcome back, {}!\n\n\
         • Tier: {}\n\
         • Free credits: {}\n\
         • Premium credits: {}\n\
         • MVP credits: {}\n\
         • TDL balance: {}\n\n\
         Use /scan to analyze an address or /dashboard for a full overview.",
        escape(&user.username),
        user.tier.as_str().to_uppercase(),
        credits.free,
        credits.premium,
        credits.mvp,
        credits.tdl_balance,
    ))
    .with_actions(main_menu())
}

pub fn login_failed(error: &GatewayError) -> OutgoingContent {
    OutgoingContent::text(format!(
        "❌ Login failed: {}\n\nUse /login to try again.",
        escape(&error.to_string())
    ))
}

pub fn login_retry(error: &GatewayError) -> OutgoingContent {
    with_cancel(format!(
        "❌ Login failed: {}\n\nPlease enter your password again.",
        escape(&error.to_string())
    ))
}

pub fn logged_out() -> OutgoingContent {
    OutgoingContent::text("✅ You've been logged out successfully.").with_actions(main_menu())
}

// ── Scanning ────────────────────────────────────────────────────────

pub const ASK_ADDRESS: &str = "Please enter the Solana address you want to scan.\n\
Example: <code>EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v</code>";

pub fn scan_prompt() -> OutgoingContent {
    with_cancel(format!(
        "🔍 <b>Address Scanner</b>\n\n{ASK_ADDRESS}\n\n\
         <b>Supported Types:</b>\n• Token contract address\n• Wallet address\n\n\
         Type /cancel to abort scanning."
    ))
}

pub fn choose_tier(address: &str) -> OutgoingContent {
    OutgoingContent::text(format!(
        "✅ Address received: <code>{}</code>\n\nSelect a scan tier:",
        escape(address)
    ))
    .with_actions(tier_menu())
}

pub fn choose_tier_reminder() -> OutgoingContent {
    OutgoingContent::text("Please pick a scan tier using the buttons below.")
        .with_actions(tier_menu())
}

pub fn stale_tier() -> OutgoingContent {
    OutgoingContent::text("That scan has already finished or was cancelled. Use /scan to start a new one.")
}

pub fn scan_processing(address: &str, tier: Tier) -> OutgoingContent {
    OutgoingContent::text(format!(
        "⏳ <b>Analyzing Address...</b>\n\n\
         <code>{}</code>\n\
         Tier: {}\n\n\
         Premium and MVP scans may take a few extra seconds while we gather AI insights.",
        escape(address),
        tier.as_str().to_uppercase(),
    ))
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {}", escape(item)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn scan_result(address: &str, record: &ScanRecord) -> OutgoingContent {
    let band = record.band();
    let header = record
        .message
        .as_deref()
        .map(|m| format!("<i>{}</i>\n\n", escape(m)))
        .unwrap_or_default();
    OutgoingContent::text(format!(
        "{header}📊 <b>Scan Results</b>\n\n\
         <b>Address:</b> <code>{}</code>\n\
         <b>Type and Tier:</b> {} • {}\n\
         <b>Risk Score:</b> {:.2} / 1.0 {} {}\n\
         <b>Risk Level:</b> {}\n\n\
         <b>⚠️ Risk Factors</b>\n{}\n\n\
         <b>✅ Positive Signals</b>\n{}\n\n\
         <b>🤖 AI Insight</b>\n{}\n\n\
         <b>📈 Recommendation</b>\n{}",
        escape(&shorten_address(address)),
        escape(&record.asset_type.to_uppercase()),
        record.tier_used.as_str().to_uppercase(),
        record.risk_score,
        band.badge(),
        band.label(),
        escape(&record.risk_level),
        bullets(&record.risk_factors),
        bullets(&record.positive_signals),
        escape(&record.ai_summary),
        escape(&record.recommendation),
    ))
    .with_actions(main_menu())
}

// ── Account ─────────────────────────────────────────────────────────

fn tier_benefits(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => "• 5 scans/day\n• Basic analysis",
        Tier::Premium => "• 50 scans/day\n• Advanced AI insights",
        Tier::Mvp => "• Unlimited scans\n• Real-time monitoring",
    }
}

pub fn dashboard(user: &UserProfile) -> OutgoingContent {
    let credits = &user.credits;
    OutgoingContent::text(format!(
        "📊 <b>Your Dashboard</b>\n\n\
         <b>Account</b>\n\
         • Email: {}\n\
         • Username: {}\n\
         • Tier: {}\n\
         • Member since: {}\n\n\
         <b>Credits</b>\n\
         • Free: {}\n\
         • Premium: {}\n\
         • MVP: {}\n\
         • TDL balance: {}\n\n\
         <b>Usage</b>\n\
         • Scans today: {}\n\
         • Daily limit: {}\n\
         • Total scans: {}\n\n\
         <b>Benefits</b>\n{}\n\n\
         Need more power? Use /upgrade or /pricing.",
        escape(user.email.as_deref().unwrap_or("N/A")),
        escape(&user.username),
        user.tier.as_str().to_uppercase(),
        escape(user.created_at.as_deref().unwrap_or("N/A")),
        credits.free,
        credits.premium,
        credits.mvp,
        credits.tdl_balance,
        user.scans_today,
        user.daily_limit,
        user.total_scans,
        tier_benefits(user.tier),
    ))
    .with_actions(main_menu())
}

pub fn balance(credits: &CreditBalances) -> OutgoingContent {
    OutgoingContent::text(format!(
        "💰 <b>Your Balances</b>\n\n\
         TDL: {} TDL\n\
         Tier: {}\n\n\
         <b>Scan credits</b>\n\
         • Free: {}\n\
         • Premium: {}\n\
         • MVP: {}\n\n\
         Use /buy_credits to add more TDL.",
        credits.tdl_balance,
        credits.derived_tier().as_str().to_uppercase(),
        credits.free,
        credits.premium,
        credits.mvp,
    ))
}

pub fn history(entries: &[ScanHistoryEntry]) -> OutgoingContent {
    if entries.is_empty() {
        return OutgoingContent::text("📭 No scan history found.");
    }
    let mut text = String::from("📜 <b>Recent Scans</b>\n");
    for (i, entry) in entries.iter().enumerate() {
        let score = entry
            .risk_score
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "N/A".to_string());
        text.push_str(&format!(
            "\n{}. <code>{}</code>\n   {} • risk {} ({})",
            i + 1,
            escape(&shorten_address(&entry.address)),
            escape(&entry.tier.to_uppercase()),
            score,
            escape(&entry.risk_level),
        ));
        if let Some(at) = entry.created_at.as_deref() {
            text.push_str(&format!(" • {}", escape(at)));
        }
        text.push('\n');
    }
    OutgoingContent::text(text)
}

// ── Payments ────────────────────────────────────────────────────────

pub fn payment_usage() -> OutgoingContent {
    OutgoingContent::text(
        "Usage: <code>/verify_payment &lt;tx_signature&gt; [premium|mvp]</code>\n\
         The tier defaults to premium.",
    )
}

pub fn payment_success(message: &str) -> OutgoingContent {
    OutgoingContent::text(format!("✅ {}", escape(message))).with_actions(main_menu())
}

// ── Admin ───────────────────────────────────────────────────────────

fn stat(map: &Object, keys: &[&str], default: &str) -> String {
    escape(&fields::first_str(map, keys).unwrap_or_else(|| default.to_string()))
}

pub fn admin_overview(stats: &Object) -> OutgoingContent {
    OutgoingContent::text(format!(
        "🛡️ <b>SPL Shield Admin Panel</b>\n\n\
         <b>System Stats:</b>\n\
         • Total Users: {}\n\
         • Active Today: {}\n\
         • Total Scans: {}\n\
         • Scans Today: {}\n\n\
         <b>Revenue:</b>\n\
         • Total TDL: {}\n\
         • Today: {}\n\n\
         Use /stats, /users, /transactions for details.",
        stat(stats, &["total_users"], "0"),
        stat(stats, &["active_today", "active_users"], "0"),
        stat(stats, &["total_scans"], "0"),
        stat(stats, &["scans_today"], "0"),
        stat(stats, &["total_revenue", "revenue_total"], "0"),
        stat(stats, &["revenue_today"], "0"),
    ))
}

pub fn detailed_stats(stats: &Object) -> OutgoingContent {
    OutgoingContent::text(format!(
        "📊 <b>Detailed Statistics</b>\n\n\
         <b>Users by Tier:</b>\n\
         • Free: {}\n\
         • Premium: {}\n\
         • MVP: {}\n\n\
         <b>Scans:</b>\n\
         • Today: {}\n\
         • This Week: {}\n\
         • This Month: {}\n\n\
         <b>System Health:</b>\n\
         • API Status: {}\n\
         • Uptime: {}",
        stat(stats, &["free_users"], "0"),
        stat(stats, &["premium_users"], "0"),
        stat(stats, &["mvp_users"], "0"),
        stat(stats, &["scans_today"], "0"),
        stat(stats, &["scans_week"], "0"),
        stat(stats, &["scans_month"], "0"),
        stat(stats, &["api_status"], "Unknown"),
        stat(stats, &["uptime"], "N/A"),
    ))
}

pub const USERS_SHOWN: usize = 20;
pub const TRANSACTIONS_SHOWN: usize = 15;

pub fn users(users: &[Object]) -> OutgoingContent {
    if users.is_empty() {
        return OutgoingContent::text("👥 No users to show.");
    }
    let mut text = String::from("👥 <b>User Management</b>\n");
    for user in users.iter().take(USERS_SHOWN) {
        text.push_str(&format!(
            "\n• {} ({})\n  Tier: {} | Scans: {}\n",
            stat(user, &["username", "name"], "unknown"),
            stat(user, &["email"], "no email"),
            stat(user, &["tier"], "free"),
            stat(user, &["total_scans", "scans"], "0"),
        ));
    }
    OutgoingContent::text(text)
}

pub fn transactions(transactions: &[Object]) -> OutgoingContent {
    if transactions.is_empty() {
        return OutgoingContent::text("💳 No transactions to show.");
    }
    let mut text = String::from("💳 <b>Recent Transactions</b>\n");
    for tx in transactions.iter().take(TRANSACTIONS_SHOWN) {
        text.push_str(&format!(
            "\n• {} - {} TDL\n  Type: {} | {}\n",
            stat(tx, &["user", "username", "user_id"], "unknown"),
            stat(tx, &["amount", "tdl_amount"], "0"),
            stat(tx, &["type", "tier"], "purchase"),
            stat(tx, &["timestamp", "created_at"], "N/A"),
        ));
    }
    OutgoingContent::text(text)
}

// ── Failures ────────────────────────────────────────────────────────

/// User-facing rendering of a backend failure, with the matching hint.
pub fn gateway_error(error: &GatewayError) -> OutgoingContent {
    let text = match error {
        GatewayError::Unauthorized(msg) => format!(
            "🔒 Not authorized: {}\nPlease /login again.",
            escape(msg)
        ),
        GatewayError::InsufficientBalance(msg) => format!(
            "💳 {}\nUse /buy_credits to add funds.",
            escape(msg)
        ),
        GatewayError::RateLimited(msg) => format!(
            "⏳ {}\nUpgrade your tier with /upgrade for higher limits.",
            escape(msg)
        ),
        GatewayError::Network(msg) => format!(
            "🌐 Could not reach SPL Shield ({}). Please try again later.",
            escape(msg)
        ),
        GatewayError::UnexpectedFormat => {
            "⚠️ Unexpected response format. Please try again later.".to_string()
        }
        GatewayError::Http { message, .. } => format!("❌ {}", escape(message)),
    };
    OutgoingContent::text(text).with_actions(main_menu())
}
