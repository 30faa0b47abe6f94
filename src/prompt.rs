use crate::llm::Message;
use crate::profile::UserProfile;

const BASE_PROMPT: &str = "
You are a nutrition assistant. Given a meal description, return a single JSON object with:
- items: array of {name, quantity_text, estimated_grams (optional), calories_estimate, protein_g, carbs_g, fat_g, estimated}
- totals: {calories, protein_g, carbs_g, fat_g}
- suggestions: array of short suggestions
Return ONLY valid JSON.
";

const RESTRICTION_GUIDANCE: &str = " When producing items and suggestions, AVOID foods that violate the listed dietary restrictions. \
For example, if 'Vegetarian' is listed, do NOT include meat, fish, poultry, or seafood. \
If 'Vegan' is listed, also avoid dairy, eggs, and honey. \
If 'Nut-free' is listed, avoid nuts and nut-containing foods. \
If 'Gluten-free' is listed, avoid wheat, bread, pasta, and other gluten-containing ingredients. \
If 'Dairy-free' is listed, avoid milk, cheese, butter, yogurt, and similar dairy ingredients. \
If 'Halal' or 'Kosher' are listed, avoid pork and other explicitly forbidden foods for those diets. \
If 'Others' is listed, assume no automatic restrictions unless specified in the meal description.";

pub fn build_system_prompt(profile: &UserProfile) -> String {
    let gender = profile.gender.map(|g| g.as_str()).unwrap_or("unspecified");
    let age_group = profile.age_group.map(|a| a.as_str()).unwrap_or("unspecified");
    let mut context = format!("User profile: gender={gender}, age_group={age_group}.");

    if profile.restrictions.is_empty() {
        context.push_str(" No dietary restrictions.");
    } else {
        let labels: Vec<&str> = profile.restrictions.iter().map(|r| r.label()).collect();
        context.push_str(&format!(" Dietary restrictions: {}.", labels.join(", ")));
        context.push_str(RESTRICTION_GUIDANCE);
    }

    format!("{BASE_PROMPT}\n\n{context}")
}

/// System prompt followed by the meal as the user turn
pub fn build_messages(meal: &str, profile: &UserProfile) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(profile)),
        Message::user(meal),
    ]
}
