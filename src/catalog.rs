//! Form catalog — static registry of questionnaire definitions.
//!
//! Built once at startup and passed into the engine; no mutation afterwards.
//! Question order is fixed for the process lifetime, and the sink header row
//! for a form is derived from it.

/// Metadata columns prepended to every submission row.
pub const META_HEADERS: [&str; 3] = ["timestamp_utc", "user_id", "username"];

/// A single questionnaire definition.
#[derive(Debug, Clone)]
pub struct FormDef {
    /// Stable identifier (also used in logs).
    pub id: &'static str,
    /// Worksheet title in the sink.
    pub title: &'static str,
    /// Menu button label shown in the main keyboard.
    pub menu_label: &'static str,
    /// Prompts, asked in order.
    pub questions: Vec<String>,
}

impl FormDef {
    /// Expected sink header row: metadata columns followed by the questions.
    pub fn headers(&self) -> Vec<String> {
        META_HEADERS
            .iter()
            .map(|h| h.to_string())
            .chain(self.questions.iter().cloned())
            .collect()
    }
}

/// Read-only lookup of all forms.
pub struct FormCatalog {
    forms: Vec<FormDef>,
}

impl FormCatalog {
    /// Build a catalog from explicit definitions.
    pub fn with_forms(forms: Vec<FormDef>) -> Self {
        Self { forms }
    }

    pub fn new() -> Self {
        Self {
            forms: vec![
                FormDef {
                    id: "parent_full",
                    title: "Parent questionnaire",
                    menu_label: "📋 Parent questionnaire",
                    questions: parent_full_questions(),
                },
                FormDef {
                    id: "parent_short",
                    title: "Short parent questionnaire",
                    menu_label: "📝 Short parent questionnaire",
                    questions: parent_short_questions(),
                },
                FormDef {
                    id: "child_full",
                    title: "Camper questionnaire",
                    menu_label: "👦 Camper questionnaire",
                    questions: child_full_questions(),
                },
                FormDef {
                    id: "child_short",
                    title: "Short camper questionnaire",
                    menu_label: "✏️ Short camper questionnaire",
                    questions: child_short_questions(),
                },
            ],
        }
    }

    /// All forms, in menu order.
    pub fn forms(&self) -> impl Iterator<Item = &FormDef> {
        self.forms.iter()
    }

    /// Resolve a form id.
    pub fn get(&self, form_id: &str) -> Option<&FormDef> {
        self.forms.iter().find(|f| f.id == form_id)
    }

    /// Resolve a main-menu button press to its form.
    pub fn by_menu_label(&self, text: &str) -> Option<&FormDef> {
        self.forms.iter().find(|f| f.menu_label == text)
    }
}

impl Default for FormCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_full_questions() -> Vec<String> {
    [
        "Your Telegram username.",
        "Child's full name.",
        "Child's age.",
        "Date of birth (dd.mm.yyyy).",
        "Which school does your child attend?",
        "Child's height (approximate).",
        "Child's weight (approximate).",
        "Has the child been to our camp before? (Yes/No)",
        "How did you hear about us?",
        "Does your child want to go to camp?",
        "Has the child been to any camp before?",
        "If yes, what did they like about camp?",
        "What did they dislike?",
        "Did the child decide to go to camp this year on their own, or did you encourage it?",
        "What are your child's hobbies? (clubs, sports, activities)",
        "Any medical restrictions on sports activity?",
        "Any food or medicine intolerances, or allergies?",
        "Does the child get sick often? If so, with what?",
        "Any chronic conditions? If so, which?",
        "Any past injuries (fractures, bruises, concussions)?",
        "Name 5 adjectives that describe your child.",
        "Any difficulties in relationships with peers or adults?",
        "What does your child most enjoy doing in their free time?",
        "Can the child swim?",
        "What games do they prefer?",
        "What films do they most enjoy watching?",
        "Where and how does your child usually spend vacations?",
        "Which kind of holiday do they enjoy most?",
        "Do they make contact with new people easily?",
        "How do they adapt to new surroundings?",
        "How do they react to criticism?",
        "If they cry, what do you usually do?",
        "How would you describe your child's independence and self-care?",
        "Has your child ever gotten into fights with other kids?",
        "How does your child get along with classmates?",
        "Is your child more outgoing or more shy?",
        "Who is your child's main social circle? Who do they spend the most time with?",
        "How do classmates treat your child?",
        "Have you told the child that phones and gadgets are not allowed at camp? (Yes/No)",
        "Have you told the child that bringing food from home is not allowed? (Yes/No)",
        "Are you planning to order a photo session for the camp session? (Yes/No)",
        "Anything else the counselors should know about the child and their particularities.",
        "What are your expectations for the session? What should we try to do?",
        "Optionally add a link to a photo that best characterizes your child.",
        "Optionally add a link to your child's social media profile.",
        "Mother's full name.",
        "Mother's phone numbers (mobile, work, home).",
        "Father's full name.",
        "Father's phone numbers (mobile, work, home).",
        "Parents' address and whereabouts during the camp session.",
        "Name and phone of any third parties allowed to pick up the child (if any).",
    ]
    .map(String::from)
    .into()
}

fn parent_short_questions() -> Vec<String> {
    [
        "Your Telegram username.",
        "Child's full name.",
        "Child's age.",
        "Date of birth.",
        "Which school does your child attend?",
        "Child's height (approximate).",
        "Child's weight (approximate).",
        "Any medical restrictions on sports activity?",
        "Any food or medicine intolerances, or allergies?",
        "Any chronic conditions? If so, which?",
        "Have you told the child that phones and gadgets are not allowed at camp? (Yes/No)",
        "Have you told the child that bringing food from home is not allowed? (Yes/No)",
        "Are you planning to order a photo session for the camp session? (Yes/No)",
        "Anything else the counselors should know about the child and their particularities.",
        "What are your expectations for the session? What should we try to do?",
        "Mother's full name.",
        "Mother's phone numbers (mobile, work, home).",
        "Father's full name.",
        "Father's phone numbers (mobile, work, home).",
        "Parents' address and whereabouts during the camp session.",
        "Name and phone of any third parties allowed to pick up the child (if any).",
    ]
    .map(String::from)
    .into()
}

fn child_full_questions() -> Vec<String> {
    [
        "What's your name (first name)?",
        "Your last name?",
        "How old are you?",
        "Pick a few counselor qualities you find most important (up to 5), comma-separated.\n\
         Options: Should stand in for parents at camp; Should be your friend; Should be \
         good-looking; Fair; Responsive; Strict; Sociable; Creative; Should know a lot; \
         Should help out; Can sing and dance; Upbeat and cheerful; Knows lots of fun games; \
         Always nearby; Athletic; Knows lots of funny stories; Life of the party; Lives \
         healthy; Notices when you need support; Can bring the group together.",
        "Is this your first time at camp, or have you been before? If so, how many times?",
        "Do you want to go to camp? (Yes/No)",
        "What are you most looking forward to at camp? What would you most like to try? \
         Pick at least 2, comma-separated.\n\
         Options: Make new friends; Become one team with the others; Learn new things; \
         Get healthier; Improve fitness; Perform on stage; Just relax; Have a fun time; \
         Be away from parents; Show what I can do.",
        "Do you play any sports? For how long? Any awards or achievements? Any sports you'd like to try?",
        "If it's not a secret, are you going alone or with friends?",
        "Who would you like to share a room with?",
        "Would you rather be in a group with kids your age and a bit older, or a bit younger?",
        "Please finish the sentence: I'm coming to camp because...",
        "I don't want camp to...",
        "I'm afraid that at camp...",
        "I want camp to...",
        "I want my group to be made of kids who...",
        "I'll be bored if the group spends its time on...",
        "I'll be against it if I'm forced to...",
        "At camp I want to learn...",
        "What else would you like to tell me about yourself?",
        "Did you know you can't bring food to camp? (Yes/No)",
        "Did you know phones and gadgets are not allowed at camp? (Yes/No)",
        "If your parents allow it and you want to, share a link to your social profile.",
    ]
    .map(String::from)
    .into()
}

fn child_short_questions() -> Vec<String> {
    [
        "What's your name (first name)?",
        "Your last name?",
        "How old are you?",
        "Who would you like to share a room with?",
        "Do you want to go to camp? (Yes/No)",
        "Did you know you can't bring food to camp? (Yes/No)",
        "Did you know phones and gadgets are not allowed at camp? (Yes/No)",
        "What else would you like to tell me?",
    ]
    .map(String::from)
    .into()
}
