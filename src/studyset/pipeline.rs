//! Lyrics → validated exercise pack. Combines lexical heuristics, an
//! LLM call constrained by JSON schema, and deterministic post-processing
//! (bucketed say-it-back selection, scrambling, interleaving).

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::llm::LlmClient;
use super::scramble::{apply_permutation, derive_seed, remap_index, scramble_four};
use super::StudySetError;

const FILLER_PATTERN: &str = r"(?i)\((oh+|ah+|yeah+|na+|la+|woah+|hey+)[\s,]*\)\s*$";
const REPEAT_SUFFIX_PATTERN: &str = r"(?i)\s*\[(x\d+|repeat[^\]]*)\]\s*$";
const LEADING_MARKER_PATTERN: &str = r"^\s*(?:[-*•]|\d+[.)])\s+";
const SECTION_HEADER_PATTERN: &str = r"^\s*\[[^\]]+\]\s*$";

const RATIONALE_PREFIXES: &[&str] = &[
    "Correct:", "Correcto:", "Richtig:", "Correct :", "正解:", "正解：", "Правильно:",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Referent {
    pub fragment: String,
    pub annotation: String,
    pub classification: Option<String>,
    pub votes: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySetRequest {
    pub learner_lang: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    pub lyrics: String,
    #[serde(default)]
    pub referents: Vec<Referent>,
    #[serde(default)]
    pub translation_count: usize,
    #[serde(default)]
    pub trivia_count: usize,
    #[serde(default)]
    pub say_it_back_count: usize,
}

#[derive(Debug, Clone)]
struct TaggedLine {
    id: String,
    index: usize,
    text: String,
    lang: String,
    lang2: Option<String>,
    difficulty: f32,
    repeated: bool,
    all_positions: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    Easy,
    Medium,
    Hard,
}

impl Bucket {
    fn for_difficulty(d: f32) -> Self {
        if d < 2.33 {
            Bucket::Easy
        } else if d < 3.67 {
            Bucket::Medium
        } else {
            Bucket::Hard
        }
    }

    fn score(self) -> f32 {
        match self {
            Bucket::Easy => 2.0,
            Bucket::Medium => 3.0,
            Bucket::Hard => 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Question {
    SayItBack {
        id: String,
        source_line_id: String,
        text: String,
    },
    Mcq {
        id: String,
        mcq_type: String,
        source_line_id: String,
        prompt: String,
        choices: [String; 4],
        correct_index: usize,
        choice_rationales: [String; 4],
        difficulty_score: f32,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StudySetPack {
    pub prompt_hash: String,
    pub questions: Vec<Question>,
    pub warnings: Vec<String>,
}

pub async fn generate_study_set(
    req: &StudySetRequest,
    llm: &dyn LlmClient,
) -> Result<StudySetPack, StudySetError> {
    let mut warnings = Vec::new();

    let lines = collect_lines(&req.lyrics)?;
    let tagged = tag_lines(&lines, req, llm).await?;
    let line_map: HashMap<&str, &TaggedLine> = tagged.iter().map(|l| (l.id.as_str(), l)).collect();

    let say_it_back = select_say_it_back(&tagged, req.say_it_back_count);

    let translation_candidates = select_translation_candidates(&tagged, &req.learner_lang);
    if req.translation_count > 0 && translation_candidates.is_empty() {
        warnings.push("no translatable lines found; skipping translation questions".to_string());
    }

    let prompt_hash = compute_prompt_hash(req, &tagged);

    let mut questions = Vec::new();
    for (i, line) in say_it_back.iter().enumerate() {
        questions.push(Question::SayItBack {
            id: format!("sib_{i}"),
            source_line_id: line.id.clone(),
            text: line.text.clone(),
        });
    }

    let need_llm_mcqs = req.translation_count > 0 || req.trivia_count > 0;
    let mut mcqs = Vec::new();
    if need_llm_mcqs {
        let effective_translation_count = req.translation_count.min(translation_candidates.len());
        let effective_trivia_count = if req.referents.is_empty() {
            0
        } else {
            req.trivia_count
        };
        if req.referents.is_empty() && req.trivia_count > 0 {
            warnings.push("no referents supplied; skipping trivia questions".to_string());
        }

        if effective_translation_count > 0 || effective_trivia_count > 0 {
            mcqs = generate_mcqs(
                req,
                &tagged,
                &translation_candidates,
                effective_translation_count,
                effective_trivia_count,
                &prompt_hash,
                llm,
            )
            .await?;
        }
    }

    for mcq in &mut mcqs {
        if let Question::Mcq {
            id,
            mcq_type,
            choices,
            correct_index,
            choice_rationales,
            ..
        } = mcq
        {
            let seed = derive_seed(&prompt_hash, mcq_type, id, 0);
            let perm = scramble_four(seed);
            *choices = apply_permutation(choices, &perm);
            *choice_rationales = apply_permutation(choice_rationales, &perm);
            *correct_index = remap_index(&perm, *correct_index);
        }
    }

    let say_it_back_questions: Vec<Question> = questions;
    let translation_questions: Vec<Question> = mcqs
        .iter()
        .filter(|q| matches!(q, Question::Mcq { mcq_type, .. } if mcq_type == "translation"))
        .cloned()
        .collect();
    let trivia_questions: Vec<Question> = mcqs
        .iter()
        .filter(|q| matches!(q, Question::Mcq { mcq_type, .. } if mcq_type == "trivia"))
        .cloned()
        .collect();

    let interleaved = interleave(say_it_back_questions, translation_questions, trivia_questions);

    validate_pack(&interleaved, &line_map, &prompt_hash)?;

    Ok(StudySetPack {
        prompt_hash,
        questions: interleaved,
        warnings,
    })
}

fn collect_lines(lyrics: &str) -> Result<Vec<String>, StudySetError> {
    let leading_marker = Regex::new(LEADING_MARKER_PATTERN).unwrap();
    let filler = Regex::new(FILLER_PATTERN).unwrap();
    let repeat_suffix = Regex::new(REPEAT_SUFFIX_PATTERN).unwrap();
    let section_header = Regex::new(SECTION_HEADER_PATTERN).unwrap();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<String> = Vec::new();

    for raw in lyrics.split(['\r', '\n']) {
        let mut line = raw.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if section_header.is_match(&line) {
            continue;
        }
        line = leading_marker.replace(&line, "").to_string();
        line = filler.replace(&line, "").trim_end().to_string();
        line = repeat_suffix.replace(&line, "").trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        let word_count = line.split_whitespace().count();
        if word_count < 3 || line.chars().count() > 180 {
            continue;
        }
        let key = line.to_lowercase();
        if !seen.contains_key(&key) {
            seen.insert(key, out.len());
            out.push(line);
        }
    }

    if out.is_empty() {
        return Err(StudySetError::Validation("no usable lyric lines after sanitization".into()));
    }
    Ok(out)
}

async fn tag_lines(
    lines: &[String],
    req: &StudySetRequest,
    llm: &dyn LlmClient,
) -> Result<Vec<TaggedLine>, StudySetError> {
    let hints: Vec<Value> = lines
        .iter()
        .enumerate()
        .map(|(i, text)| {
            json!({
                "index": i,
                "text": text,
                "top1kRatio": top_k_ratio(text),
                "fleschKincaid": flesch_kincaid(text),
                "longWordRatio": long_word_ratio(text),
            })
        })
        .collect();

    let schema = json!({
        "type": "object",
        "properties": {
            "lines": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "index": {"type": "integer"},
                        "lang": {"type": "string"},
                        "lang2": {"type": ["string", "null"]},
                        "difficulty": {"type": "number"}
                    },
                    "required": ["index", "lang", "difficulty"]
                }
            }
        },
        "required": ["lines"]
    });

    let system = "You tag song lyric lines with a BCP-47-ish language code and a 1-5 difficulty score.";
    let user = json!({ "lines": hints }).to_string();

    let response = llm
        .complete_json(system, &user, "line_tags", schema)
        .await
        .map_err(StudySetError::Llm)?;

    let llm_lines = response
        .get("lines")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let llm_by_index: HashMap<usize, Value> = llm_lines
        .into_iter()
        .filter_map(|v| v.get("index").and_then(Value::as_u64).map(|i| (i as usize, v)))
        .collect();

    let mut all_positions_by_text: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, text) in lines.iter().enumerate() {
        all_positions_by_text.entry(text.to_lowercase()).or_default().push(i);
    }

    let mut out = Vec::with_capacity(lines.len());
    for (i, text) in lines.iter().enumerate() {
        let lexical = lexical_difficulty(text);
        let entry = llm_by_index.get(&i);
        let llm_difficulty = entry
            .and_then(|v| v.get("difficulty"))
            .and_then(Value::as_f64)
            .map(|d| d as f32)
            .unwrap_or(lexical);
        let lang = entry
            .and_then(|v| v.get("lang"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("und")
            .to_string();
        let lang2 = entry
            .and_then(|v| v.get("lang2"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let positions = all_positions_by_text.get(&text.to_lowercase()).cloned().unwrap_or_default();
        let repeated = positions.len() > 1;

        let mut difficulty = 0.7 * llm_difficulty + 0.3 * lexical;
        if repeated {
            difficulty -= 0.35;
        }
        if lang2.is_some() {
            difficulty += 0.25;
        }
        difficulty = difficulty.clamp(1.0, 5.0);

        out.push(TaggedLine {
            id: format!("line_{i}"),
            index: i,
            text: text.clone(),
            lang,
            lang2,
            difficulty,
            repeated,
            all_positions: positions,
        });
    }

    Ok(out)
}

const COMMON_WORDS: &[&str] = &[
    "the", "a", "i", "you", "to", "and", "it", "of", "in", "is", "that", "was", "for", "on",
    "are", "with", "as", "my", "me", "your", "we", "this", "be", "have", "not", "but", "all",
    "can", "she", "he", "they", "what", "so", "love", "no", "just", "like", "know", "one",
    "up", "out", "go", "do", "will", "if", "now", "time", "when", "got", "want", "never",
];

fn top_k_ratio(text: &str) -> f32 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words.iter().filter(|w| COMMON_WORDS.contains(&w.as_str())).count();
    hits as f32 / words.len() as f32
}

fn long_word_ratio(text: &str) -> f32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let long = words.iter().filter(|w| w.chars().count() >= 7).count();
    long as f32 / words.len() as f32
}

fn count_syllables(word: &str) -> u32 {
    let mut count = 0u32;
    let mut prev_vowel = false;
    for ch in word.to_lowercase().chars() {
        let is_vowel = matches!(ch, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if is_vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = is_vowel;
    }
    count.max(1)
}

fn flesch_kincaid(text: &str) -> f32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let syllables: u32 = words.iter().map(|w| count_syllables(w)).sum();
    let word_count = words.len() as f32;
    0.39 * word_count + 11.8 * (syllables as f32 / word_count) - 15.59
}

fn lexical_difficulty(text: &str) -> f32 {
    let top1k = top_k_ratio(text);
    let fk = flesch_kincaid(text);
    let fk_norm = ((fk - 2.0) / 10.0).clamp(0.0, 1.0);
    let long_ratio = long_word_ratio(text);
    let raw = 0.55 * (1.0 - top1k) + 0.25 * fk_norm + 0.20 * long_ratio;
    1.0 + 4.0 * raw.clamp(0.0, 1.0)
}

fn select_say_it_back(lines: &[TaggedLine], count: usize) -> Vec<TaggedLine> {
    if count == 0 {
        return Vec::new();
    }

    let base = count / 3;
    let remainder = count % 3;
    let medium_quota = base + if remainder >= 1 { 1 } else { 0 };
    let easy_quota = base + if remainder >= 2 { 1 } else { 0 };
    let hard_quota = base;

    let mut quotas = HashMap::new();
    quotas.insert(Bucket::Medium, medium_quota);
    quotas.insert(Bucket::Easy, easy_quota);
    quotas.insert(Bucket::Hard, hard_quota);

    let mut buckets: HashMap<Bucket, Vec<&TaggedLine>> = HashMap::new();
    for line in lines {
        buckets.entry(Bucket::for_difficulty(line.difficulty)).or_default().push(line);
    }

    let mut selected: Vec<TaggedLine> = Vec::new();
    let mut used_ids: std::collections::HashSet<String> = std::collections::HashSet::new();

    // Pre-seed up to two repeated lines.
    for line in lines.iter().filter(|l| l.repeated).take(2) {
        if selected.len() >= count {
            break;
        }
        used_ids.insert(line.id.clone());
        selected.push(line.clone());
        if let Some(q) = quotas.get_mut(&Bucket::for_difficulty(line.difficulty)) {
            *q = q.saturating_sub(1);
        }
    }

    let order = [Bucket::Medium, Bucket::Easy, Bucket::Hard];
    let mut deficit = 0usize;
    for bucket in order {
        let quota = quotas.get(&bucket).copied().unwrap_or(0) + deficit;
        let candidates: Vec<&&TaggedLine> = buckets
            .get(&bucket)
            .map(|v| v.iter().filter(|l| !used_ids.contains(&l.id)).collect())
            .unwrap_or_default();
        let n = candidates.len();
        let k = quota.min(n);
        deficit = quota - k;

        if k > 0 {
            let step = n as f32 / k as f32;
            let mut picked = std::collections::HashSet::new();
            for i in 0..k {
                let mut idx = ((step * i as f32) + step / 2.0).floor() as usize;
                if idx >= n {
                    idx = n - 1;
                }
                while picked.contains(&idx) && idx + 1 < n {
                    idx += 1;
                }
                picked.insert(idx);
                let line = candidates[idx];
                if used_ids.insert(line.id.clone()) {
                    selected.push((*line).clone());
                }
            }
        }
    }

    selected.truncate(count);
    selected
}

fn select_translation_candidates<'a>(lines: &'a [TaggedLine], learner_lang: &str) -> Vec<&'a TaggedLine> {
    let learner_prefix: String = learner_lang.chars().take(2).collect::<String>().to_lowercase();
    let mut candidates: Vec<(&TaggedLine, f32)> = lines
        .iter()
        .filter(|l| {
            let line_prefix: String = l.lang.chars().take(2).collect::<String>().to_lowercase();
            line_prefix != learner_prefix
        })
        .map(|l| {
            let mut distance = (l.difficulty - 3.3).abs();
            if l.repeated {
                distance += 0.1;
            }
            if l.text.split_whitespace().count() < 4 {
                distance += 0.2;
            }
            (l, distance)
        })
        .collect();
    candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    candidates.into_iter().take(24).map(|(l, _)| l).collect()
}

async fn generate_mcqs(
    req: &StudySetRequest,
    tagged: &[TaggedLine],
    translation_candidates: &[&TaggedLine],
    translation_count: usize,
    trivia_count: usize,
    prompt_hash: &str,
    llm: &dyn LlmClient,
) -> Result<Vec<Question>, StudySetError> {
    let line_ids: Vec<&str> = tagged.iter().map(|l| l.id.as_str()).collect();
    let lines_payload: Vec<Value> = tagged
        .iter()
        .map(|l| {
            json!({
                "id": l.id,
                "text": l.text,
                "lang": l.lang,
                "difficulty": l.difficulty,
            })
        })
        .collect();
    let referents_payload: Vec<Value> = req
        .referents
        .iter()
        .take(24)
        .map(|r| {
            json!({
                "fragment": r.fragment,
                "annotation": r.annotation,
                "classification": r.classification,
                "votes": r.votes,
            })
        })
        .collect();
    let translation_ids: Vec<&str> = translation_candidates.iter().map(|l| l.id.as_str()).collect();

    let schema = json!({
        "type": "object",
        "properties": {
            "questions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {"type": "string", "enum": ["translation", "trivia"]},
                        "sourceLineId": {"type": "string", "enum": line_ids},
                        "difficultyBucket": {"type": "string", "enum": ["easy", "medium", "hard"]},
                        "prompt": {"type": "string"},
                        "choices": {"type": "array", "items": {"type": "string"}, "minItems": 4, "maxItems": 4},
                        "correctIndex": {"type": "integer", "minimum": 0, "maximum": 3},
                        "choiceRationales": {"type": "array", "items": {"type": "string"}, "minItems": 4, "maxItems": 4}
                    },
                    "required": ["type", "sourceLineId", "prompt", "choices", "correctIndex", "choiceRationales"]
                }
            }
        },
        "required": ["questions"]
    });

    let system = "You write multiple-choice lyric comprehension questions. \
        Translation questions are Jeopardy-style: the prompt describes the line's meaning in the \
        learner's language, and the choices are lyric lines in their original language. \
        Trivia questions extract one concrete fact from a referent annotation.";
    let user = json!({
        "learnerLanguage": req.learner_lang,
        "track": {"title": req.title, "artist": req.artist, "album": req.album},
        "counts": {"translation": translation_count, "trivia": trivia_count},
        "translationCandidateLineIds": translation_ids,
        "lines": lines_payload,
        "referents": referents_payload,
    })
    .to_string();

    let response = llm
        .complete_json(system, &user, "mcq_questions", schema)
        .await
        .map_err(StudySetError::Llm)?;

    let raw_questions = response
        .get("questions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let line_map: HashMap<&str, &TaggedLine> = tagged.iter().map(|l| (l.id.as_str(), l)).collect();
    let rationale_prefix_re = build_rationale_prefix_regex();

    let mut translation_out = Vec::new();
    let mut trivia_out = Vec::new();

    for (i, raw) in raw_questions.into_iter().enumerate() {
        let mcq_type = raw.get("type").and_then(Value::as_str).unwrap_or("").to_string();
        let source_line_id = raw
            .get("sourceLineId")
            .and_then(Value::as_str)
            .ok_or_else(|| StudySetError::Generation("mcq missing sourceLineId".into()))?;
        let source_line = line_map
            .get(source_line_id)
            .ok_or_else(|| StudySetError::Generation(format!("unknown sourceLineId {source_line_id}")))?;

        let prompt = normalize_whitespace(raw.get("prompt").and_then(Value::as_str).unwrap_or(""));
        let choices_raw: Vec<String> = raw
            .get("choices")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(normalize_whitespace).collect())
            .unwrap_or_default();
        if choices_raw.len() != 4 {
            return Err(StudySetError::Generation("mcq must have exactly 4 choices".into()));
        }
        let rationales_raw: Vec<String> = raw
            .get("choiceRationales")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(|s| strip_rationale_prefix(&normalize_whitespace(s), &rationale_prefix_re))
                    .collect()
            })
            .unwrap_or_default();
        if rationales_raw.len() != 4 {
            return Err(StudySetError::Generation("mcq must have exactly 4 rationales".into()));
        }
        let correct_index = raw
            .get("correctIndex")
            .or_else(|| raw.get("correct_index"))
            .and_then(Value::as_u64)
            .ok_or_else(|| StudySetError::Generation("mcq missing correctIndex".into()))? as usize;
        if correct_index > 3 {
            return Err(StudySetError::Generation("correctIndex out of range".into()));
        }

        let bucket = raw
            .get("difficultyBucket")
            .and_then(Value::as_str)
            .and_then(|s| match s {
                "easy" => Some(Bucket::Easy),
                "medium" => Some(Bucket::Medium),
                "hard" => Some(Bucket::Hard),
                _ => None,
            })
            .unwrap_or_else(|| Bucket::for_difficulty(source_line.difficulty));
        let difficulty_score = (0.55 * bucket.score() + 0.45 * source_line.difficulty).clamp(1.0, 5.0);

        let choices: [String; 4] = [
            choices_raw[0].clone(),
            choices_raw[1].clone(),
            choices_raw[2].clone(),
            choices_raw[3].clone(),
        ];
        let choice_rationales: [String; 4] = [
            rationales_raw[0].clone(),
            rationales_raw[1].clone(),
            rationales_raw[2].clone(),
            rationales_raw[3].clone(),
        ];

        let question = Question::Mcq {
            id: format!("mcq_{mcq_type}_{i}"),
            mcq_type: mcq_type.clone(),
            source_line_id: source_line_id.to_string(),
            prompt,
            choices,
            correct_index,
            choice_rationales,
            difficulty_score,
        };

        match mcq_type.as_str() {
            "translation" => translation_out.push(question),
            "trivia" => trivia_out.push(question),
            _ => return Err(StudySetError::Generation(format!("unknown mcq type {mcq_type}"))),
        }
    }

    translation_out.truncate(translation_count);
    trivia_out.truncate(trivia_count);
    let mut all = translation_out;
    all.extend(trivia_out);
    Ok(all)
}

fn build_rationale_prefix_regex() -> Regex {
    let escaped: Vec<String> = RATIONALE_PREFIXES.iter().map(|p| regex::escape(p)).collect();
    Regex::new(&format!("^(?:{})\\s*", escaped.join("|"))).unwrap()
}

fn strip_rationale_prefix(s: &str, re: &Regex) -> String {
    re.replace(s, "").trim().to_string()
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compute_prompt_hash(req: &StudySetRequest, tagged: &[TaggedLine]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(req.learner_lang.as_bytes());
    hasher.update(req.title.as_bytes());
    hasher.update(req.artist.as_bytes());
    for line in tagged {
        hasher.update(line.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn interleave(say_it_back: Vec<Question>, translation: Vec<Question>, trivia: Vec<Question>) -> Vec<Question> {
    let mut queues = [say_it_back, translation, trivia];
    let mut out = Vec::new();
    let mut last: Option<usize> = None;

    loop {
        let mut pick: Option<usize> = None;
        for idx in 0..3 {
            if queues[idx].is_empty() || Some(idx) == last {
                continue;
            }
            match pick {
                None => pick = Some(idx),
                Some(best) if queues[idx].len() > queues[best].len() => pick = Some(idx),
                _ => {}
            }
        }
        // If every non-empty queue equals `last`, allow repeating the type
        // rather than stalling when only one type remains.
        if pick.is_none() {
            for idx in 0..3 {
                if !queues[idx].is_empty() {
                    pick = Some(idx);
                    break;
                }
            }
        }
        let Some(idx) = pick else { break };
        out.push(queues[idx].remove(0));
        last = Some(idx);
    }

    out
}

fn validate_pack(
    questions: &[Question],
    line_map: &HashMap<&str, &TaggedLine>,
    prompt_hash: &str,
) -> Result<(), StudySetError> {
    if prompt_hash.len() != 64 || !prompt_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StudySetError::Generation("prompt hash has unexpected shape".into()));
    }
    let mut ids = std::collections::HashSet::new();
    for q in questions {
        match q {
            Question::SayItBack { id, source_line_id, .. } => {
                if !ids.insert(id.clone()) {
                    return Err(StudySetError::Generation(format!("duplicate question id {id}")));
                }
                if !line_map.contains_key(source_line_id.as_str()) {
                    return Err(StudySetError::Generation(format!("say-it-back references unknown line {source_line_id}")));
                }
            }
            Question::Mcq {
                id,
                source_line_id,
                choices,
                choice_rationales,
                correct_index,
                difficulty_score,
                ..
            } => {
                if !ids.insert(id.clone()) {
                    return Err(StudySetError::Generation(format!("duplicate question id {id}")));
                }
                if !line_map.contains_key(source_line_id.as_str()) {
                    return Err(StudySetError::Generation(format!("mcq references unknown line {source_line_id}")));
                }
                if choices.len() != 4 || choice_rationales.len() != 4 {
                    return Err(StudySetError::Generation("mcq must have 4 choices/rationales".into()));
                }
                if *correct_index > 3 {
                    return Err(StudySetError::Generation("correct_index out of range".into()));
                }
                if !(1.0..=5.0).contains(difficulty_score) {
                    return Err(StudySetError::Generation("difficulty_score out of range".into()));
                }
            }
        }
    }
    Ok(())
}
