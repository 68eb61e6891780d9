//! Fallback dictionary used when the word bank has no history. These are
//! ordinary, low-token English words; the bank learns which ones actually
//! move the classifier and ranks them over time.

pub const DEFAULT_WORDS: &[&str] = &[
    "please",
    "kindly",
    "thanks",
    "hello",
    "summary",
    "notes",
    "report",
    "review",
    "overview",
    "update",
    "reminder",
    "schedule",
    "meeting",
    "agenda",
    "minutes",
    "draft",
    "memo",
    "context",
    "background",
    "reference",
    "question",
    "answer",
    "example",
    "tutorial",
    "guide",
    "lesson",
    "homework",
    "study",
    "research",
    "learning",
    "education",
    "science",
    "history",
    "culture",
    "travel",
    "weather",
    "recipe",
    "garden",
    "music",
    "movie",
    "book",
    "story",
    "poem",
    "article",
    "journal",
    "blog",
    "newsletter",
    "greetings",
    "welcome",
    "friendly",
    "helpful",
    "polite",
    "gentle",
    "calm",
    "quiet",
    "simple",
    "clear",
    "brief",
    "short",
    "plain",
    "normal",
    "regular",
    "typical",
    "common",
    "general",
    "basic",
    "standard",
    "everyday",
    "ordinary",
    "casual",
    "informal",
    "morning",
    "afternoon",
    "evening",
    "today",
    "tomorrow",
    "weekend",
    "holiday",
    "birthday",
    "family",
    "friends",
    "neighbor",
    "community",
    "volunteer",
    "charity",
    "kindness",
    "wellness",
    "health",
    "fitness",
    "walking",
    "reading",
    "writing",
    "drawing",
    "cooking",
    "baking",
    "coffee",
    "breakfast",
    "lunch",
    "dinner",
    "picnic",
];
