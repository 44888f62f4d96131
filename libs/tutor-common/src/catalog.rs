use crate::types::{Problem, TestCase};
use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Content store entries stay fresh for five minutes
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    data: Value,
    fetched_at: Instant,
}

/// Read-through view over the static problem content store.
///
/// The store is a directory laid out as:
/// - `problems/<id>.json`
/// - `testcases/<id>.json`
/// - `topics/<topic>/problems.json`
///
/// Documents are cached in memory for [`CACHE_TTL`]. Problems missing from the
/// store are served from a small built-in dataset with the same shape.
pub struct ProblemCatalog {
    root: PathBuf,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl ProblemCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ttl: CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get a problem by id, falling back to the built-in dataset.
    pub fn problem(&self, id: &str) -> Result<Problem> {
        check_id(id)?;
        match self.fetch::<Problem>(&format!("problems/{}.json", id)) {
            Ok(problem) => Ok(problem),
            Err(e) => {
                warn!(problem_id = id, error = %e, "Problem not in content store, trying fallback");
                fallback::problem(id).ok_or(e)
            }
        }
    }

    /// Get the grading cases for a problem, falling back to the built-in dataset.
    pub fn test_cases(&self, id: &str) -> Result<Vec<TestCase>> {
        check_id(id)?;
        match self.fetch::<Vec<TestCase>>(&format!("testcases/{}.json", id)) {
            Ok(cases) => Ok(cases),
            Err(e) => {
                warn!(problem_id = id, error = %e, "Test cases not in content store, trying fallback");
                fallback::test_cases(id).ok_or(e)
            }
        }
    }

    pub fn problems_by_topic(&self, topic: &str) -> Result<Vec<Problem>> {
        check_id(topic)?;
        self.fetch(&format!("topics/{}/problems.json", topic))
    }

    /// Every problem in the store plus fallback problems the store does not shadow.
    pub fn list_problems(&self) -> Result<Vec<Problem>> {
        let mut problems = Vec::new();
        let dir = self.root.join("problems");

        if dir.is_dir() {
            let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
                .with_context(|| format!("Failed to list {}", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .collect();
            paths.sort();

            for path in paths {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                problems.push(self.fetch(&format!("problems/{}.json", stem))?);
            }
        }

        for problem in fallback::problems() {
            if !problems.iter().any(|p: &Problem| p.id == problem.id) {
                problems.push(problem);
            }
        }

        Ok(problems)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn fetch<T: DeserializeOwned>(&self, relative: &str) -> Result<T> {
        let now = Instant::now();
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| anyhow!("Content cache lock poisoned"))?;
            if let Some(entry) = cache.get(relative) {
                if now.duration_since(entry.fetched_at) < self.ttl {
                    debug!(path = relative, "Content cache hit");
                    return serde_json::from_value(entry.data.clone())
                        .with_context(|| format!("Failed to decode {}", relative));
                }
            }
        }

        let path = self.root.join(relative);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let decoded = serde_json::from_value(data.clone())
            .with_context(|| format!("Failed to decode {}", relative))?;

        self.cache
            .lock()
            .map_err(|_| anyhow!("Content cache lock poisoned"))?
            .insert(
                relative.to_string(),
                CacheEntry {
                    data,
                    fetched_at: now,
                },
            );

        Ok(decoded)
    }
}

fn check_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        bail!("Invalid content id: {:?}", id);
    }
    Ok(())
}

/// Built-in dataset served when the content store is unavailable
pub mod fallback {
    use crate::types::{Problem, TestCase};
    use serde_json::json;

    const LINKED_LIST_PRE: &str = r#"class ListNode {
    constructor(val, next) {
        this.val = val === undefined ? 0 : val;
        this.next = next === undefined ? null : next;
    }
}

function arrayToLinkedList(arr) {
    let head = null;
    for (let i = arr.length - 1; i >= 0; i--) {
        head = new ListNode(arr[i], head);
    }
    return head;
}"#;

    const LINKED_LIST_POST: &str = r#"function linkedListToArray(head) {
    const out = [];
    while (head) {
        out.push(head.val);
        head = head.next;
    }
    return out;
}"#;

    pub fn problems() -> Vec<Problem> {
        let raw = json!([
            {
                "id": "two-sum",
                "title": "Two Sum",
                "difficulty": "Easy",
                "description": "Given an array of integers nums and an integer target, return indices of the two numbers such that they add up to target.\n\nYou may assume that each input would have exactly one solution, and you may not use the same element twice.\n\nYou can return the answer in any order.",
                "examples": [
                    {
                        "input": "nums = [2,7,11,15], target = 9",
                        "output": "[0,1]",
                        "explanation": "Because nums[0] + nums[1] == 9, we return [0, 1]."
                    },
                    { "input": "nums = [3,2,4], target = 6", "output": "[1,2]" },
                    { "input": "nums = [3,3], target = 6", "output": "[0,1]" }
                ],
                "constraints": [
                    "2 <= nums.length <= 10^4",
                    "-10^9 <= nums[i] <= 10^9",
                    "-10^9 <= target <= 10^9",
                    "Only one valid answer exists."
                ],
                "starterCode": "function twoSum(nums, target) {\n    // Your code here\n    \n}",
                "hints": [
                    "Think about what data structure can help you look up values quickly.",
                    "Consider using a hash map to store numbers you've seen and their indices.",
                    "For each number, check if (target - current number) exists in your hash map."
                ],
                "timeEstimate": "15 min",
                "companies": ["Google", "Facebook", "Amazon", "Microsoft"],
                "topic": "arrays"
            },
            {
                "id": "merge-intervals",
                "title": "Merge Intervals",
                "difficulty": "Medium",
                "description": "Given an array of intervals where intervals[i] = [starti, endi], merge all overlapping intervals, and return an array of the non-overlapping intervals that cover all the intervals in the input.",
                "examples": [
                    {
                        "input": "intervals = [[1,3],[2,6],[8,10],[15,18]]",
                        "output": "[[1,6],[8,10],[15,18]]",
                        "explanation": "Since intervals [1,3] and [2,6] overlap, merge them into [1,6]."
                    }
                ],
                "constraints": [
                    "1 <= intervals.length <= 10^4",
                    "intervals[i].length == 2",
                    "0 <= starti <= endi <= 10^4"
                ],
                "starterCode": "function merge(intervals) {\n    // Your code here\n    \n}",
                "hints": [
                    "Consider sorting the intervals first by their start time.",
                    "Think about when two intervals overlap.",
                    "You can merge intervals by updating the end time of the previous interval."
                ],
                "timeEstimate": "25 min",
                "companies": ["Microsoft", "Amazon", "Google"],
                "topic": "arrays"
            },
            {
                "id": "merge-two-sorted-lists",
                "title": "Merge Two Sorted Lists",
                "difficulty": "Easy",
                "description": "Merge two sorted linked lists and return the head of the merged list.",
                "starterCode": "function mergeTwoLists(list1, list2) {\n    // Your code here\n    \n}",
                "hints": ["Keep a dummy head and splice the smaller node each step."],
                "timeEstimate": "20 min",
                "companies": ["Amazon", "Apple"],
                "topic": "linked-lists",
                "preProcessCode": LINKED_LIST_PRE,
                "postProcessCode": LINKED_LIST_POST
            }
        ]);

        serde_json::from_value(raw).unwrap_or_default()
    }

    pub fn problem(id: &str) -> Option<Problem> {
        problems().into_iter().find(|p| p.id == id)
    }

    pub fn test_cases(id: &str) -> Option<Vec<TestCase>> {
        let raw = match id {
            "two-sum" => json!([
                { "input": { "nums": [2, 7, 11, 15], "target": 9 }, "expected": [0, 1], "description": "Basic case with solution at beginning" },
                { "input": { "nums": [3, 2, 4], "target": 6 }, "expected": [1, 2], "description": "Solution not at beginning" },
                { "input": { "nums": [3, 3], "target": 6 }, "expected": [0, 1], "description": "Duplicate numbers" }
            ]),
            "merge-intervals" => json!([
                { "input": { "intervals": [[1, 3], [2, 6], [8, 10], [15, 18]] }, "expected": [[1, 6], [8, 10], [15, 18]], "description": "Multiple overlapping intervals" },
                { "input": { "intervals": [[1, 4], [4, 5]] }, "expected": [[1, 5]], "description": "Adjacent intervals" }
            ]),
            "merge-two-sorted-lists" => json!([
                { "input": { "list1": [1, 2, 4], "list2": [1, 3, 4] }, "expected": [1, 1, 2, 3, 4, 4], "description": "Interleaved lists" },
                { "input": { "list1": [], "list2": [] }, "expected": [], "description": "Both lists empty" },
                { "input": { "list1": [], "list2": [0] }, "expected": [0], "description": "One list empty" }
            ]),
            _ => return None,
        };

        serde_json::from_value(raw).ok()
    }
}
