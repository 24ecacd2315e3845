//! User-facing message copy and keyboard labels.

use crate::catalog::FormCatalog;

pub const CONSENT_ACCEPT_LABEL: &str = "✅ Yes, I agree";
pub const CONSENT_DECLINE_LABEL: &str = "❌ No, I don't agree";
pub const HELP_LABEL: &str = "ℹ️ Help";

/// Affirmative consent answers, matched case-insensitively after trimming.
const YES_TOKENS: [&str; 7] = ["yes", "y", "yep", "yeah", "ok", "okay", "agree"];

/// Negative consent answers.
const NO_TOKENS: [&str; 4] = ["no", "n", "nope", "disagree"];

pub fn is_yes(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    t == CONSENT_ACCEPT_LABEL.to_lowercase() || YES_TOKENS.contains(&t.as_str())
}

pub fn is_no(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    t == CONSENT_DECLINE_LABEL.to_lowercase() || NO_TOKENS.contains(&t.as_str())
}

pub const CONSENT_PROMPT: &str = "🏕 Welcome to the camp bot!\n\n\
    📄 Before we continue, we need your consent to process your personal data.\n\n\
    Do you agree to our personal data policy?";

pub const CONSENT_THANKS: &str = "✅ Thank you!\n\n\
    You can now fill in questionnaires. Pick one from the menu:";

pub const CONSENT_REFUSED: &str = "❌ We can't continue without your consent.\n\n\
    If you change your mind, tap \"Yes, I agree\" or send /start";

pub const CONSENT_REPROMPT: &str = "⚠️ Please use the buttons below to answer:";

pub const MENU_PROMPT: &str = "📋 Pick a questionnaire from the menu below:";

pub const CANCELLED: &str = "❌ Questionnaire cancelled.\n\n\
    You can start over by picking one from the menu:";

pub const NOTHING_TO_CANCEL: &str = "ℹ️ No questionnaire in progress.";

pub const SAVING: &str = "⏳ Saving your answers...";

pub const SAVED: &str = "✅ All done! Your questionnaire has been saved.\n\n\
    🎉 Thank you for filling it in!\n\n\
    You can fill in another one or come back to the menu:";

pub const SAVE_FAILED: &str = "❌ Something went wrong while saving your answers.\n\n\
    Please try again later or contact an administrator.";

pub const BROADCAST_PROMPT: &str = "📢 Broadcast mode\n\n\
    Send one message with what should go out to every user:\n\n\
    • Text\n\
    • Photo with a caption\n\
    • Photo without a caption\n\n\
    Use /cancel to back out.";

pub const BROADCAST_EMPTY: &str = "⚠️ No users to broadcast to.";

pub const BROADCAST_CANCELLED: &str = "❌ Broadcast cancelled.";

pub const BROADCAST_FAILED: &str = "❌ Broadcast could not start. Please try again later.";

pub const TURN_FAILED: &str = "⚠️ Something went wrong. Please try again.";

pub fn greeting(name: &str) -> String {
    format!("👋 Welcome, {name}!\n\n📋 Pick a questionnaire from the menu below:")
}

pub fn form_intro(title: &str, question_count: usize) -> String {
    format!(
        "📄 {title}\n\n📝 {question_count} questions in total.\n\n\
         Answer them one at a time.\nUse /cancel to stop.\n\nHere we go! 👇"
    )
}

pub fn broadcast_report(recipients: usize, sent: usize, failed: usize) -> String {
    format!(
        "✅ Broadcast finished!\n\n👥 Recipients: {recipients}\n📨 Sent: {sent}\n❌ Failed: {failed}"
    )
}

/// Main menu keyboard rows: one button per form, then help.
pub fn main_menu_rows(catalog: &FormCatalog) -> Vec<Vec<String>> {
    catalog
        .forms()
        .map(|f| vec![f.menu_label.to_string()])
        .chain(std::iter::once(vec![HELP_LABEL.to_string()]))
        .collect()
}

/// Consent prompt keyboard rows.
pub fn consent_rows() -> Vec<Vec<String>> {
    vec![
        vec![CONSENT_ACCEPT_LABEL.to_string()],
        vec![CONSENT_DECLINE_LABEL.to_string()],
    ]
}

pub fn help_text(catalog: &FormCatalog) -> String {
    let mut text = String::from(
        "ℹ️ Available commands:\n\n\
         /start - Start the bot and show the main menu\n\
         /cancel - Cancel the questionnaire in progress\n\
         /help - Show this help\n\n\
         📋 Available questionnaires:\n\n",
    );
    for form in catalog.forms() {
        text.push_str(&format!("• {} - {} questions\n", form.title, form.questions.len()));
    }
    text.push_str(
        "\n💡 How it works:\n\
         1. Pick a questionnaire from the menu\n\
         2. Answer the questions one at a time\n\
         3. Use /cancel if you need to stop\n\
         4. Your answers are saved when you finish\n\n\
         ❓ Questions? Contact an administrator.",
    );
    text
}
