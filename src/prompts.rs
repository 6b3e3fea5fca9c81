pub const SLIDES: &str = r#"
Turn the following repository contents into a Markdown slide deck in Marp format that helps a newcomer understand the project.
Respond with the Markdown only, nothing else. Use triple backticks for code blocks."#;

/// Short-form narration, one pass over tree, README and curated files
pub const NARRATION: &str = r#"
Write a podcast episode about the following repository as one SSML document.
The document must start with <speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="en-US"> and end with </speak>.
Make it a conversation: the host always uses <voice name="en-US-AvaMultilingualNeural"> and the guest uses <voice name="en-US-DustinMultilingualNeural">.
Put every <break time="..."/> inside a voice element. Keep the intro short.
Cover the purpose of the project, its main components and how they interact, and one technically interesting detail.
Respond with the SSML only."#;

/// Long-form narration, first half: structure from tree and README
pub const NARRATION_STRUCTURAL: &str = r#"
Write the first half of a podcast episode about the following repository as one SSML document.
The document must start with <speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="en-US"> and end with </speak>.
The host always uses <voice name="en-US-AvaMultilingualNeural"> and the guest uses <voice name="en-US-DustinMultilingualNeural">.
Put every <break time="..."/> inside a voice element. Keep the intro short.
Discuss the project structure, its architecture and the main components. End by telling listeners you will be back after the break.
Respond with the SSML only."#;

/// Long-form narration, second half: the curated file contents
pub const NARRATION_DEEP: &str = r#"
Write the second half of a podcast episode about the following source files as one SSML document.
The document must start with <speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="en-US"> and end with </speak>.
The host always uses <voice name="en-US-AvaMultilingualNeural"> and the guest uses <voice name="en-US-DustinMultilingualNeural">.
Put every <break time="..."/> inside a voice element. Open by welcoming listeners back from the break and do not introduce anyone again.
Walk through the important code: what calls what, what is instantiated where, and any notable optimization.
Respond with the SSML only."#;

/// Diagram stage 1, file tree and README to an architecture explanation
pub const DIAGRAM_EXPLANATION: &str = r#"
You will receive the file tree of a project in <file_tree> tags and its README in <readme> tags.
Explain to a principal engineer how to draw an accurate system design diagram of this project:
identify the project type, its main components and how they interact, and the diagram layout that fits best.
Enclose the whole explanation in <explanation> tags."#;

/// Diagram stage 2, explanation and tree to a component mapping
pub const DIAGRAM_COMPONENT_MAPPING: &str = r#"
You will receive an architecture explanation in <explanation> tags and the project's file tree in <file_tree> tags.
Map each component of the explanation to the directory or file that implements it, as a numbered list of "Component: path" lines.
Map as many components as possible. Enclose the list in <component_mapping> tags."#;

/// Diagram stage 3, explanation and mapping to Mermaid source
pub const DIAGRAM_MERMAID: &str = r#"
You will receive an architecture explanation in <explanation> tags and a component mapping in <component_mapping> tags.
Write a Mermaid.js flowchart of the system. For every mapped component add a click event of the form: click NodeId "path/from/mapping".
Quote node labels that contain special characters. Respond with the Mermaid code only, without code fences."#;

/// Appended to diagram stages when the user supplied instructions
pub const CUSTOM_INSTRUCTIONS: &str = r#"
The user supplied additional instructions in <instructions> tags. Give them priority.
If they are unrelated to the task, unclear or impossible to follow, respond with exactly: BAD_INSTRUCTIONS"#;

/// Asks for the most informative files of a tree
pub const FILE_SELECTION: &str = r#"
You will receive the file tree of a repository, one path per line.
List the source files that best explain how the project works, most important first, one path per line exactly as written in the tree.
Respond with the list only."#;
