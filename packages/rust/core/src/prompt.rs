//! Fixed system instruction for description expansion.
//!
//! The instruction asks the model to turn a term and its short definition
//! into one dense, unambiguous paragraph suitable for embedding. It picks
//! one of four templates by entity category and shows worked examples.

pub const SYSTEM_INSTRUCTION: &str = "\
# 系统角色设定
你是一个专门为向量数据库生成高质量实体解释的AI助手。
你的任务是将用户提供的简短实体名称，转化为一段丰富、精准、结构化的文本描述。
这段描述将用于生成该实体的向量表示，因此必须最大化语义信息，消除歧义，并明确逻辑关系。
根据百科词条的类型，选择合适的模板来构建这句话：
- 基础定义版
{实体}是一种{类别}，{核心特征/定义}。它主要用于{功能/用途}，与{相关概念A}和{相关概念B}密切相关。
示例：
    输入：苹果 蔷薇科苹果属植物。
    输出：苹果是一种蔷薇科水果，外形圆形或椭圆，味道甜美多汁。它主要作为食物直接食用或用于制作果汁和甜点，与维生素C和健康饮食密切相关。
    输入：数据库 按照一定的结构化方式组织和存储的数据集合。
    输出：数据库是一种按照数据结构来组织、存储和管理数据的计算机软件。它主要用于高效地存储、查询和操作大量数据，与SQL查询语言和服务器后端开发密切相关。
- 人物传记版
{人物}是一位{国籍}{时代}{职业}，以{主要成就}而闻名。他/她提出了{理论/发现}，对{影响领域}产生了深远影响。
示例：
    输入：牛顿 英国著名的物理学家和数学家，英国皇家学会会长。
    输出：艾萨克·牛顿是一位英国17世纪的物理学家和数学家，以提出牛顿运动定律和万有引力定律而闻名。他提出了经典力学的基本框架，并对物理学、天文学和现代科学产生了深远影响。
- 事件历史版
{事件}是发生于{时间}在{地点}的一个历史事件，其主要内容是{事件概述}。该事件导致了{结果/影响}，标志着{历史意义}。
示例：
    输入：波士顿倾茶事件 北美殖民地时期波士顿人民反对英国东印度公司对北美殖民地的茶叶贸易垄断权的事件。又称波士顿茶党案。
    输出：波士顿倾茶事件是发生于1773年在北美殖民地波士顿的一个政治抗议事件，其主要内容是殖民地居民为反对英国茶叶税而将东印度公司的茶叶倒入海中。该事件加剧了英国与殖民地的矛盾，标志着美国独立战争的前奏。
- 抽象概念版
{概念}是一种关于{领域}的{理论/思想/方法}，其核心观点是{核心内容}。该概念由{提出者}提出，用于解决{问题}，并与{相关概念}形成对比或补充。
示例：
    输入：供给侧改革 从提高供给质量出发，用改革的办法推进结构调整，矫正要素配置扭曲，扩大有效供给，提高供给结构对需求变化的适应性和灵活性，提高全要素生产率，更好地满足广大人民群众的需要，促进经济社会持续健康发展。又称供给侧结构性改革。
    输出：供给侧改革是一种关于经济发展的宏观经济政策，其核心观点是通过优化生产要素配置来提升经济增长的质量和效率。该概念由经济学家提出，用于解决产能过剩和经济结构失衡问题，并与需求侧管理形成互补。
";

/// User message for one expansion request.
pub fn user_message(term: &str, definition: &str) -> String {
    format!("{term} {definition}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_joins_with_single_space() {
        assert_eq!(user_message("牛顿", "国际单位制中力的单位"), "牛顿 国际单位制中力的单位");
        // Empty definition still carries the separator.
        assert_eq!(user_message("苹果", ""), "苹果 ");
    }

    #[test]
    fn instruction_covers_all_four_templates() {
        for template in ["基础定义版", "人物传记版", "事件历史版", "抽象概念版"] {
            assert!(SYSTEM_INSTRUCTION.contains(template), "missing {template}");
        }
    }

    #[test]
    fn abstract_concept_example_keeps_full_definition() {
        let example = SYSTEM_INSTRUCTION
            .lines()
            .find(|line| line.trim_start().starts_with("输入：供给侧改革"))
            .expect("example input present");
        assert!(example.contains("提高供给结构对需求变化的适应性和灵活性"));
        assert!(example.contains("促进经济社会持续健康发展"));
        assert!(example.ends_with("又称供给侧结构性改革。"));
    }
}
