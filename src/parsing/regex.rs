use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    pub static ref RE_HEADER: Regex = Regex::new(r"^\s*\[CHAT WINDOW TEXT\]\s*\[(?P<stamp>[^\]]+)\]\s*(?P<body>.*?)\s*$").unwrap();

    pub static ref RE_DAMAGE: Regex = Regex::new(r"(?i)^(?P<attacker>.+?)\s+damages\s+(?P<target>[^:]+?)\s*:\s*(?P<total>[\d,]+)\s*\((?P<breakdown>[^)]*)\)").unwrap();
    pub static ref RE_ABSORB: Regex = Regex::new(r"(?i)^(?P<target>.+?)\s*:\s*Damage Immunity absorbs\s+(?P<amount>[\d,]+)\s+points?(?:\(s\))?\s+of\s+(?P<type>.+?)\s*$").unwrap();

    // Ability prefixes ("Off Hand : ", "Sneak Attack : ") are skipped lazily.
    pub static ref RE_ATTACK: Regex = Regex::new(r"(?i)^(?:[^:]+:\s*)*?(?P<attacker>[^:]+?)\s+attacks\s+(?P<target>[^:]+?)\s*:\s*(?P<rest>.*)$").unwrap();
    pub static ref RE_ATTACK_OUTCOME: Regex = Regex::new(r"(?i)\*\s*(?P<outcome>critical hit|hit|miss|parried|resisted|target concealed:\s*\d+%|attacker miss chance:\s*\d+%)\s*\*").unwrap();
    pub static ref RE_ATTACK_ROLL: Regex = Regex::new(r"\(\s*(?P<roll>\d+)\s*(?P<sign>[-+])\s*(?P<bonus>-?\d+)\s*=\s*(?P<total>-?\d+)").unwrap();

    pub static ref RE_SAVE: Regex = Regex::new(r"(?i)^(?:SAVE:\s*)?(?P<target>[^:]+?)\s*:\s*(?P<save_type>Fortitude|Fort|Reflex|Will)\s+Save\b(?P<rest>.*)$").unwrap();
    pub static ref RE_SAVE_OUTCOME: Regex = Regex::new(r"(?i)\*\s*(?P<result>success|succeeded|failed|failure)\s*\*").unwrap();
    pub static ref RE_SAVE_ROLL: Regex = Regex::new(r"\(\s*(?P<roll>\d+)\s*(?P<sign>[-+])\s*(?P<bonus>-?\d+)").unwrap();
    pub static ref RE_SAVE_DC: Regex = Regex::new(r"(?i)DC\s*:?\s*(?P<dc>\d+)").unwrap();
}
