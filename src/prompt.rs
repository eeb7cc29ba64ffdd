use serde::Serialize;

use crate::recommendation::Category;

const RECOMMENDATION_PREAMBLE: &str = "You are the recommendation engine for \"Everyday Magic\", a personal assistant app.\nGenerate 3 high-quality personalized recommendations based on the user request.";

const IMAGE_PREAMBLE: &str = "You are the image analysis engine for \"Everyday Magic\", a personal assistant app.\nAnalyze the provided image and generate insightful observations that can lead to personalized recommendations.";

/// Extra guidance per category, empty for anything unrecognized.
pub fn category_instructions(category: Option<&str>) -> &'static str {
    let Some(category) = category.and_then(|c| c.parse::<Category>().ok()) else {
        return "";
    };

    match category {
        Category::Meals => "* For meal recommendations, include cuisine type and approximate preparation time\n* Consider dietary preferences if mentioned in the request\n* Focus on dishes that match the sentiment/mood of the request\n",
        Category::Entertainment => "* For entertainment recommendations, include genre and approximate duration\n* Mention platform availability where applicable (Netflix, Hulu, etc.)\n* Match the tone/mood of the content to the request\n",
        Category::Fashion => "* For fashion recommendations, specify occasion suitability\n* Consider seasonality and weather conditions if applicable\n* Include styling tips or pairing suggestions\n",
        Category::Fitness => "* For fitness recommendations, include intensity level and time requirement\n* Specify equipment needed (if any) or mention if bodyweight only\n* Consider experience level in recommendations\n",
        Category::Travel => "* For travel recommendations, include location details and best season to visit\n* Mention approximate budget category (budget, mid-range, luxury)\n* Highlight unique experiences or attractions\n",
        Category::Books => "* For book recommendations, include author and publication year\n* Mention genre and approximate reading time/length\n* Compare to similar well-known works where helpful\n",
        Category::Music => "* For music recommendations, include artist and genre\n* Mention album or release year where relevant\n* Suggest specific occasions or moods when the music would be most enjoyable\n",
    }
}

#[derive(Serialize)]
struct ExampleItem<'a> {
    title: &'a str,
    reasoning: &'a str,
    category: &'a str,
}

/// One literal item showing the expected shape, echoing the caller's category.
fn example_output(category: Option<&str>) -> String {
    let example = [ExampleItem {
        title: "Example Title Without Any Asterisks or Formatting",
        reasoning: "Example reasoning for this recommendation",
        category: category.unwrap_or(Category::Books.as_str()),
    }];
    // Serializing plain strings cannot fail
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

pub fn build_recommendation_prompt(user_text: &str, category: Option<&str>) -> String {
    let category = category.filter(|c| !c.is_empty());
    let mut result = String::with_capacity(user_text.len() + 2048);

    result.push_str("## INSTRUCTIONS\n\n");
    result.push_str(RECOMMENDATION_PREAMBLE);
    result.push_str("\n\n## USER REQUEST\n\n");
    result.push_str(&format!("\"{}\"\n\n", user_text));

    result.push_str("## OUTPUT REQUIREMENTS\n\n");
    result.push_str("* Response MUST be a valid JSON array containing exactly 3 recommendation objects\n");
    result.push_str("* Each recommendation object MUST have these properties:\n");
    result.push_str("  - \"title\": A plain text title WITHOUT any Markdown formatting (no asterisks, no bold, no formatting characters)\n");
    result.push_str("  - \"reasoning\": Brief explanation (1-2 sentences) justifying the recommendation\n");
    result.push_str(&format!("  - \"category\": One of: {}\n", Category::names()));
    if let Some(category) = category {
        result.push_str(&format!("* Focus recommendations on the category: \"{}\"\n", category));
    }
    result.push_str(category_instructions(category));
    result.push_str("* DO NOT include any explanatory text outside the JSON array\n");
    result.push_str("* DO NOT include any markdown formatting, especially no ** asterisks ** for emphasis\n");
    result.push_str("* DO NOT include backticks or code blocks\n");
    result.push_str("* NO formatting characters of any kind in the title field\n\n");

    result.push_str("## EXAMPLE OUTPUT FORMAT\n\n");
    result.push_str(&example_output(category));
    result.push_str("\n\n## IMPORTANT\n\n");
    result.push_str("Your entire response must be ONLY the JSON array and nothing else.\n");
    result.push_str("Never use asterisks, markdown, or HTML formatting in any field.\n");
    result
}

pub fn build_image_analysis_prompt(user_text: Option<&str>, category: Option<&str>) -> String {
    let user_text = user_text.filter(|t| !t.is_empty());
    let category = category.filter(|c| !c.is_empty());
    let mut result = String::with_capacity(1536);

    result.push_str("## INSTRUCTIONS\n\n");
    result.push_str(IMAGE_PREAMBLE);
    result.push_str("\n\n## USER CONTEXT\n\n");
    match user_text {
        Some(text) => result.push_str(&format!("User request: \"{}\"\n", text)),
        None => result.push_str("No specific request provided.\n"),
    }
    if let Some(category) = category {
        result.push_str(&format!("Focus on category: \"{}\"\n", category));
    }

    result.push_str("\n## OUTPUT REQUIREMENTS\n\n");
    result.push_str("* Provide a detailed analysis of the image content, focusing on relevant features\n");
    result.push_str("* Structure your response with these sections:\n");
    result.push_str("  1. \"main_subject\": A clear description of the primary subject\n");
    result.push_str("  2. \"details\": Important details or elements visible in the image\n");
    result.push_str("  3. \"context\": The situation, environment, or context of the image\n");
    result.push_str("  4. \"recommendation_ideas\": 2-3 specific ideas for recommendations based on the image\n");
    result.push_str(&format!(
        "* If the image is related to a specific category ({}), mention it\n",
        Category::names()
    ));
    result.push_str("* Write plain narrative text, not JSON\n");
    result.push_str("* Keep your analysis concise but comprehensive (150-200 words total)\n");
    result.push_str("* Be observant but avoid making unfounded assumptions\n\n");

    result.push_str("## GOAL\n\n");
    result.push_str("Help the user get personalized recommendations based on the visual content they've shared.\n");
    result
}
